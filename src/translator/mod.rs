//! Natural Language to SQL Translator
//!
//! Maps a bounded surface grammar ("show all users", "count orders by
//! status") onto a [`QueryIntent`] using the ordered template tables in
//! [`templates`], then renders SQL for the configured dialect.

pub mod clauses;
pub mod dialect;
pub mod inflect;
pub mod intent;
pub mod templates;

pub use dialect::{SqlDialect, TimeUnit, TimeWindow};
pub use intent::{OperationKind, QueryIntent};

use crate::error::{QueryError, Result};
use crate::schema::SchemaDescription;
use clauses::{TableContext, Workspace};
use intent::{Connective, Filter, OrderBy, Predicate, ReadClauses};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strsim::jaro_winkler;
use tracing::debug;

const DEFAULT_TIMESTAMP_COLUMN: &str = "created_at";

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Output of a successful translation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub generated_sql: String,
    pub operation_kind: OperationKind,
    pub source_text: String,
    pub table: String,
    pub table_in_schema: bool,
    pub intent: QueryIntent,
    pub warnings: Vec<String>,
}

pub struct Translator {
    dialect: SqlDialect,
    /// Per-table recency column, keyed by lowercase table name
    timestamp_overrides: HashMap<String, String>,
}

impl Translator {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            timestamp_overrides: HashMap::new(),
        }
    }

    pub fn with_timestamp_column(mut self, table: &str, column: &str) -> Self {
        self.timestamp_overrides.insert(table.to_lowercase(), column.to_string());
        self
    }

    pub fn with_timestamp_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (table, column) in overrides {
            self.timestamp_overrides.insert(table.to_lowercase(), column.clone());
        }
        self
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Translate `text` against `schema`.
    ///
    /// Fails with `UnrecognizedIntent` when no intent template matches and no
    /// schema table is mentioned, and with `UnresolvedTable` when an intent
    /// matched but nothing in the text can name a table.
    pub fn translate(&self, text: &str, schema: &SchemaDescription) -> Result<TranslationResult> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Err(QueryError::UnrecognizedIntent { text: text.to_string() });
        }

        let mut ws = Workspace::new(&normalized);
        let detected = templates::detect_operation(&normalized);
        let (kind, verb_end) = detected.unwrap_or((OperationKind::Select, 0));
        if verb_end > 0 {
            ws.claim(0..verb_end);
        }

        let window = if kind == OperationKind::Insert {
            None
        } else {
            clauses::extract_time_window(&mut ws)?
        };

        let table_match = match clauses::resolve_table(&ws, verb_end, schema) {
            Some(found) if found.in_schema || detected.is_some() => found,
            _ if detected.is_none() => {
                return Err(QueryError::UnrecognizedIntent { text: text.to_string() });
            }
            _ => return Err(QueryError::UnresolvedTable { text: text.to_string() }),
        };
        ws.claim(table_match.span.clone());
        let table_end = table_match.span.end;

        let ctx = TableContext {
            schema,
            table: table_match.name.clone(),
            in_schema: table_match.in_schema,
        };

        let mut warnings = Vec::new();
        if !ctx.in_schema {
            warnings.push(unknown_table_warning(&ctx.table, schema));
        }

        let id_predicate = if kind == OperationKind::Insert {
            None
        } else {
            clauses::extract_id_shorthand(&mut ws, table_end, &ctx)
        };

        let recency = match window {
            Some(window) => match self.timestamp_column(&ctx) {
                Some(column) => Some(Predicate::Recency { column, window }),
                None => {
                    warnings.push(format!(
                        "Table '{}' has no timestamp column; time filter ignored",
                        ctx.table
                    ));
                    None
                }
            },
            None => None,
        };

        let intent = match kind {
            OperationKind::Insert => {
                let values = clauses::extract_insert_values(&mut ws, table_end, &ctx)?;
                QueryIntent::Insert { table: ctx.table.clone(), values }
            }
            OperationKind::Update => {
                let assignments = clauses::extract_set_clause(&mut ws, &ctx)?;
                let filter = build_filter(&mut ws, &ctx, id_predicate, recency)?;
                QueryIntent::Update { table: ctx.table.clone(), assignments, filter }
            }
            OperationKind::Delete => {
                let filter = build_filter(&mut ws, &ctx, id_predicate, recency)?;
                QueryIntent::Delete { table: ctx.table.clone(), filter }
            }
            OperationKind::Select | OperationKind::Count => {
                let is_count = kind == OperationKind::Count;
                let filter = build_filter(&mut ws, &ctx, id_predicate, recency)?;
                let group_by = clauses::extract_group_by(&mut ws, &ctx, is_count)?;
                let mut order_by = clauses::extract_order_by(&mut ws, &ctx, is_count)?;
                let mut limit = clauses::extract_limit(&mut ws);

                if let Some(latest) = clauses::extract_latest(&mut ws) {
                    limit = limit.or(Some(latest));
                    if order_by.is_none() {
                        match self.timestamp_column(&ctx) {
                            Some(column) => order_by = Some(OrderBy { column, descending: true }),
                            None => warnings.push(format!(
                                "Table '{}' has no timestamp column; 'latest' applied as a plain LIMIT",
                                ctx.table
                            )),
                        }
                    }
                }

                let clauses = ReadClauses { filter, group_by, order_by, limit };
                if is_count {
                    QueryIntent::Count { table: ctx.table.clone(), clauses }
                } else {
                    let columns = clauses::extract_columns(&ws, verb_end, &ctx);
                    QueryIntent::Select { table: ctx.table.clone(), columns, clauses }
                }
            }
        };

        if intent.has_placeholders() {
            warnings.push(format!(
                "Could not extract column values for {}; the generated SQL contains placeholders to complete manually",
                kind
            ));
        }

        let generated_sql = intent.to_sql(self.dialect);
        debug!("Translated '{}' as {} on {}: {}", normalized, kind, ctx.table, generated_sql);

        Ok(TranslationResult {
            generated_sql,
            operation_kind: kind,
            source_text: text.to_string(),
            table: ctx.table.clone(),
            table_in_schema: ctx.in_schema,
            intent,
            warnings,
        })
    }

    /// Configured override, then the schema's timestamp column; `created_at`
    /// only when the table itself is unknown
    fn timestamp_column(&self, ctx: &TableContext) -> Option<String> {
        if let Some(column) = self.timestamp_overrides.get(&ctx.table.to_lowercase()) {
            return Some(column.clone());
        }
        if ctx.in_schema {
            ctx.schema.timestamp_column(&ctx.table).map(|c| c.to_string())
        } else {
            Some(DEFAULT_TIMESTAMP_COLUMN.to_string())
        }
    }
}

fn build_filter(
    ws: &mut Workspace,
    ctx: &TableContext,
    id_predicate: Option<Predicate>,
    recency: Option<Predicate>,
) -> Result<Filter> {
    let mut filter = Filter::default();
    if let Some(predicate) = id_predicate {
        filter.push(Connective::And, predicate);
    }
    clauses::extract_conditions(ws, ctx, &mut filter)?;
    if let Some(predicate) = recency {
        filter.push(Connective::And, predicate);
    }
    Ok(filter.flattened())
}

fn normalize(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    collapsed.trim_end_matches(['?', '.', '!']).trim_end().to_string()
}

fn unknown_table_warning(table: &str, schema: &SchemaDescription) -> String {
    let closest = schema
        .table_names()
        .map(|name| (name, jaro_winkler(table, &name.to_lowercase())))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    match closest {
        Some((name, _)) => format!("Table '{}' not found in schema (did you mean '{}'?)", table, name),
        None => format!("Table '{}' not found in schema; using it as written", table),
    }
}
