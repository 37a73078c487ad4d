//! Execution Engine Trait - Core contract for all backend adapters
//!
//! Each adapter handles its own driver quirks (read/write dispatch, catalog
//! queries, timeouts) behind this uniform interface, and describes what it
//! can do through [`EngineCapabilities`].

use crate::error::{QueryError, Result};
use crate::execution::params::QueryParam;
use crate::execution::result::ExecutionResult;
use crate::schema::SchemaDescription;
use crate::translator::SqlDialect;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Native positional placeholder syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ...
    DollarNumbered,
    /// `?`
    QuestionMark,
    /// `?1`, `?2`, ... (plain `?` also accepted)
    QuestionNumbered,
}

/// Engine capabilities - what a backend's native driver supports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineCapabilities {
    /// SQL dialect used to render translator output
    pub dialect: SqlDialect,

    pub placeholder_style: PlaceholderStyle,

    /// Driver has no unified "run and maybe return rows" call
    pub needs_read_write_dispatch: bool,

    /// Catalog introspection fills `ColumnDescriptor::is_primary_key`
    pub reports_primary_keys: bool,

    /// Connections come from a pool rather than a single handle
    pub pooled: bool,
}

impl EngineCapabilities {
    pub fn postgres() -> Self {
        Self {
            dialect: SqlDialect::Postgres,
            placeholder_style: PlaceholderStyle::DollarNumbered,
            needs_read_write_dispatch: false,
            reports_primary_keys: false,
            pooled: true,
        }
    }

    pub fn mysql() -> Self {
        Self {
            dialect: SqlDialect::Mysql,
            placeholder_style: PlaceholderStyle::QuestionMark,
            needs_read_write_dispatch: false,
            reports_primary_keys: false,
            pooled: true,
        }
    }

    pub fn sqlite() -> Self {
        Self {
            dialect: SqlDialect::Sqlite,
            placeholder_style: PlaceholderStyle::QuestionNumbered,
            needs_read_write_dispatch: true,
            reports_primary_keys: true,
            pooled: false,
        }
    }
}

/// Execution engine trait - all backend adapters implement this
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Engine name (e.g., "postgres", "mysql", "sqlite")
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &EngineCapabilities;

    /// Execute one statement with positional parameters
    async fn execute(&self, sql: &str, params: &[QueryParam]) -> Result<ExecutionResult>;

    /// Describe one table, or every table when `table` is None.
    /// A table that does not exist yields an empty description.
    async fn introspect(&self, table: Option<&str>) -> Result<SchemaDescription>;

    /// Round-trip a trivial query
    async fn health_check(&self) -> Result<bool>;

    /// Release the pool or connection; later calls fail with a connection error
    async fn close(&self);
}

lazy_static! {
    static ref RETURNING: Regex = Regex::new(r"(?i)\bRETURNING\b").unwrap();
}

/// SELECT-ness test usable by any backend that must dispatch reads and writes
pub fn is_select(sql: &str) -> bool {
    sql.trim().to_uppercase().starts_with("SELECT")
}

/// Statements that produce a result set: SELECTs and DML with RETURNING
pub fn returns_rows(sql: &str) -> bool {
    is_select(sql) || RETURNING.is_match(sql)
}

/// Assemble one result row from `(column, type, decoded value)` cells. The
/// first cell that failed to decode fails the whole statement.
pub(crate) fn collect_row<I, E>(sql: &str, cells: I) -> Result<Map<String, Value>>
where
    I: IntoIterator<Item = (String, String, std::result::Result<Value, E>)>,
    E: Display,
{
    let mut row = Map::new();
    for (column, type_name, value) in cells {
        let value = value.map_err(|e| {
            QueryError::execution(sql, format!("cannot decode column '{}' of type {}: {}", column, type_name, e))
        })?;
        row.insert(column, value);
    }
    Ok(row)
}

/// Run `fut` under a client-side deadline
pub async fn with_timeout<T, F>(sql: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::Timeout {
            sql: sql.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
