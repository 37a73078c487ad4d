//! Structured query intent
//!
//! The translator lowers text into one of these variants and only then
//! renders SQL, so clause order in the output never depends on the order
//! phrases appeared in the input.

use crate::translator::dialect::{SqlDialect, TimeWindow};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    /// Kind of an existing SQL statement, from its leading keyword
    pub fn from_sql(sql: &str) -> Option<OperationKind> {
        let keyword = sql.trim_start().split_whitespace().next()?.to_uppercase();
        match keyword.as_str() {
            "SELECT" => Some(OperationKind::Select),
            "INSERT" => Some(OperationKind::Insert),
            "UPDATE" => Some(OperationKind::Update),
            "DELETE" => Some(OperationKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Select => "SELECT",
            OperationKind::Count => "COUNT",
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(String),
    Text(String),
    Boolean(bool),
}

impl Literal {
    /// Numbers and booleans stay bare; everything else is single-quoted
    pub fn parse(raw: &str) -> Literal {
        let trimmed = raw.trim();
        let unquoted = trimmed
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
        if let Some(text) = unquoted {
            return Literal::Text(text.to_string());
        }

        if trimmed.parse::<f64>().is_ok() && trimmed.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
            return Literal::Number(trimmed.to_string());
        }
        match trimmed.to_lowercase().as_str() {
            "true" => Literal::Boolean(true),
            "false" => Literal::Boolean(false),
            _ => Literal::Text(trimmed.to_string()),
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Literal::Number(n) => n.clone(),
            Literal::Boolean(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            Literal::Text(s) => quote(s),
        }
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LikeMode {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Compare { column: String, op: CompareOp, value: Literal },
    Like { column: String, mode: LikeMode, pattern: String },
    IsNull { column: String, negated: bool },
    Recency { column: String, window: TimeWindow },
    /// Parenthesized chain, used when a chain mixes AND with OR
    Group(Filter),
}

impl Predicate {
    pub fn to_sql(&self, dialect: SqlDialect) -> String {
        match self {
            Predicate::Compare { column, op, value } => format!("{} {} {}", column, op.as_sql(), value.to_sql()),
            Predicate::Like { column, mode, pattern } => {
                let escaped = pattern.replace('\'', "''");
                let pattern = match mode {
                    LikeMode::Contains => format!("%{}%", escaped),
                    LikeMode::StartsWith => format!("{}%", escaped),
                    LikeMode::EndsWith => format!("%{}", escaped),
                };
                format!("{} LIKE '{}'", column, pattern)
            }
            Predicate::IsNull { column, negated } => {
                format!("{} IS {}NULL", column, if *negated { "NOT " } else { "" })
            }
            Predicate::Recency { column, window } => dialect.recency_predicate(column, window),
            Predicate::Group(filter) => format!("({})", filter.to_sql(dialect).unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connective {
    And,
    Or,
}

/// Predicates joined left to right
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub terms: Vec<(Connective, Predicate)>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn push(&mut self, connective: Connective, predicate: Predicate) {
        self.terms.push((connective, predicate));
    }

    /// Drops the parentheses around a group that ended up as the only term
    pub fn flattened(mut self) -> Filter {
        if self.terms.len() == 1 && matches!(self.terms[0].1, Predicate::Group(_)) {
            if let Some((_, Predicate::Group(inner))) = self.terms.pop() {
                return inner;
            }
        }
        self
    }

    fn to_sql(&self, dialect: SqlDialect) -> Option<String> {
        if self.terms.is_empty() {
            return None;
        }
        let mut sql = String::new();
        for (idx, (connective, predicate)) in self.terms.iter().enumerate() {
            if idx > 0 {
                sql.push_str(match connective {
                    Connective::And => " AND ",
                    Connective::Or => " OR ",
                });
            }
            sql.push_str(&predicate.to_sql(dialect));
        }
        Some(sql)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// Trailing clauses shared by SELECT and COUNT
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadClauses {
    pub filter: Filter,
    pub group_by: Option<String>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryIntent {
    Select {
        table: String,
        columns: Vec<String>,
        clauses: ReadClauses,
    },
    Count {
        table: String,
        clauses: ReadClauses,
    },
    Insert {
        table: String,
        values: Vec<Assignment>,
    },
    Update {
        table: String,
        assignments: Vec<Assignment>,
        filter: Filter,
    },
    Delete {
        table: String,
        filter: Filter,
    },
}

impl QueryIntent {
    /// True when the rendered SQL contains fragments the caller must fill in
    pub fn has_placeholders(&self) -> bool {
        match self {
            QueryIntent::Insert { values, .. } => values.is_empty(),
            QueryIntent::Update { assignments, .. } => assignments.is_empty(),
            _ => false,
        }
    }

    /// Render in fixed SQL grammar order
    pub fn to_sql(&self, dialect: SqlDialect) -> String {
        match self {
            QueryIntent::Select { table, columns, clauses } => {
                let projection = match (&clauses.group_by, columns.is_empty()) {
                    (Some(group), true) => group.clone(),
                    (_, true) => "*".to_string(),
                    (_, false) => columns.iter().join(", "),
                };
                let mut sql = format!("SELECT {} FROM {}", projection, table);
                push_read_clauses(&mut sql, clauses, dialect);
                sql
            }
            QueryIntent::Count { table, clauses } => {
                let projection = match &clauses.group_by {
                    Some(group) => format!("{}, COUNT(*) as count", group),
                    None => "COUNT(*) as count".to_string(),
                };
                let mut sql = format!("SELECT {} FROM {}", projection, table);
                push_read_clauses(&mut sql, clauses, dialect);
                sql
            }
            QueryIntent::Insert { table, values } => {
                if values.is_empty() {
                    format!("INSERT INTO {} (columns) VALUES (values)", table)
                } else {
                    format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        table,
                        values.iter().map(|a| a.column.as_str()).join(", "),
                        values.iter().map(|a| a.value.to_sql()).join(", ")
                    )
                }
            }
            QueryIntent::Update { table, assignments, filter } => {
                let set = if assignments.is_empty() {
                    "column = value".to_string()
                } else {
                    assignments
                        .iter()
                        .map(|a| format!("{} = {}", a.column, a.value.to_sql()))
                        .join(", ")
                };
                let mut sql = format!("UPDATE {} SET {}", table, set);
                if let Some(where_sql) = filter.to_sql(dialect) {
                    sql.push_str(" WHERE ");
                    sql.push_str(&where_sql);
                }
                sql
            }
            QueryIntent::Delete { table, filter } => {
                let mut sql = format!("DELETE FROM {}", table);
                if let Some(where_sql) = filter.to_sql(dialect) {
                    sql.push_str(" WHERE ");
                    sql.push_str(&where_sql);
                }
                sql
            }
        }
    }
}

fn push_read_clauses(sql: &mut String, clauses: &ReadClauses, dialect: SqlDialect) {
    if let Some(where_sql) = clauses.filter.to_sql(dialect) {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
    }
    if let Some(group) = &clauses.group_by {
        sql.push_str(" GROUP BY ");
        sql.push_str(group);
    }
    if let Some(order) = &clauses.order_by {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            order.column,
            if order.descending { "DESC" } else { "ASC" }
        ));
    }
    if let Some(limit) = clauses.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::dialect::TimeUnit;

    #[test]
    fn test_literal_quoting() {
        assert_eq!(Literal::parse("42").to_sql(), "42");
        assert_eq!(Literal::parse("-3.5").to_sql(), "-3.5");
        assert_eq!(Literal::parse("shipped").to_sql(), "'shipped'");
        assert_eq!(Literal::parse("'O'Brien'").to_sql(), "'O''Brien'");
        assert_eq!(Literal::parse("\"two words\"").to_sql(), "'two words'");
        assert_eq!(Literal::parse("True").to_sql(), "TRUE");
        assert_eq!(Literal::parse("1e5").to_sql(), "'1e5'");
    }

    #[test]
    fn test_clause_order_is_fixed() {
        let mut clauses = ReadClauses {
            limit: Some(5),
            order_by: Some(OrderBy { column: "count".to_string(), descending: true }),
            group_by: Some("status".to_string()),
            ..Default::default()
        };
        clauses.filter.push(
            Connective::And,
            Predicate::Recency {
                column: "created_at".to_string(),
                window: TimeWindow::Last { amount: 30, unit: TimeUnit::Day },
            },
        );
        let intent = QueryIntent::Count { table: "orders".to_string(), clauses };
        assert_eq!(
            intent.to_sql(SqlDialect::Postgres),
            "SELECT status, COUNT(*) as count FROM orders WHERE created_at >= NOW() - INTERVAL '30 days' \
             GROUP BY status ORDER BY count DESC LIMIT 5"
        );
    }

    #[test]
    fn test_or_chain_is_grouped() {
        let mut chain = Filter::default();
        chain.push(
            Connective::And,
            Predicate::Compare { column: "status".to_string(), op: CompareOp::Eq, value: Literal::parse("new") },
        );
        chain.push(Connective::Or, Predicate::IsNull { column: "shipped_at".to_string(), negated: false });

        let mut filter = Filter::default();
        filter.push(Connective::And, Predicate::Group(chain.clone()));
        filter.push(
            Connective::And,
            Predicate::Recency { column: "created_at".to_string(), window: TimeWindow::Today },
        );
        let intent = QueryIntent::Delete { table: "orders".to_string(), filter };
        assert_eq!(
            intent.to_sql(SqlDialect::Sqlite),
            "DELETE FROM orders WHERE (status = 'new' OR shipped_at IS NULL) AND created_at >= date('now')"
        );

        let mut single = Filter::default();
        single.push(Connective::And, Predicate::Group(chain.clone()));
        assert_eq!(single.flattened(), chain);
    }

    #[test]
    fn test_placeholders() {
        let insert = QueryIntent::Insert { table: "users".to_string(), values: vec![] };
        assert!(insert.has_placeholders());
        assert_eq!(insert.to_sql(SqlDialect::Postgres), "INSERT INTO users (columns) VALUES (values)");

        let update = QueryIntent::Update {
            table: "users".to_string(),
            assignments: vec![],
            filter: Filter::default(),
        };
        assert_eq!(update.to_sql(SqlDialect::Sqlite), "UPDATE users SET column = value");
    }

    #[test]
    fn test_operation_kind_from_sql() {
        assert_eq!(OperationKind::from_sql("  select 1"), Some(OperationKind::Select));
        assert_eq!(OperationKind::from_sql("DELETE FROM t"), Some(OperationKind::Delete));
        assert_eq!(OperationKind::from_sql("DROP TABLE t"), None);
        assert_eq!(OperationKind::from_sql(""), None);
    }
}
