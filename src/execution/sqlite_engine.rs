//! SQLite Engine - embedded single-connection backend
//!
//! rusqlite has no unified "query that may return rows" call, so statements
//! are dispatched to the read or write path by shape. All driver calls run on
//! the blocking pool; a deadline interrupts the running statement.

use crate::error::{QueryError, Result};
use crate::execution::engine::{returns_rows, EngineCapabilities, ExecutionEngine};
use crate::execution::params::QueryParam;
use crate::execution::result::{hex_bytes, ColumnMeta, ExecutionResult};
use crate::schema::{ColumnDescriptor, SchemaDescription};
use crate::translator::OperationKind;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, InterruptHandle, OptionalExtension};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

pub struct SqliteEngine {
    conn: Arc<Mutex<Option<Connection>>>,
    interrupt: Arc<InterruptHandle>,
    /// Ticket of the request whose statement currently holds the connection
    active: Arc<Mutex<Option<u64>>>,
    next_ticket: AtomicU64,
    capabilities: EngineCapabilities,
    timeout: Duration,
}

impl SqliteEngine {
    /// Open `path` (":memory:" for an in-memory database)
    pub fn open(path: &str, timeout: Duration) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| QueryError::Connection(format!("Failed to open SQLite database '{}': {}", path, e)))?;

        conn.busy_timeout(timeout)
            .map_err(|e| QueryError::Connection(format!("Failed to configure SQLite: {}", e)))?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| QueryError::Connection(format!("SQLite connection test failed: {}", e)))?;

        info!("Opened SQLite database at {}", path);

        Ok(Self {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(Some(conn))),
            active: Arc::new(Mutex::new(None)),
            next_ticket: AtomicU64::new(0),
            capabilities: EngineCapabilities::sqlite(),
            timeout,
        })
    }

    fn timed_out(&self, sql: &str) -> QueryError {
        QueryError::Timeout {
            sql: sql.to_string(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    /// Run `f` against the connection on the blocking pool, under the deadline.
    ///
    /// A request whose deadline passes while it is still queued behind another
    /// statement is cancelled and never runs. The interrupt is only sent while
    /// this request's own statement holds the connection.
    async fn run<T, F>(&self, sql: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let started = Arc::new(AtomicBool::new(false));

        let conn = Arc::clone(&self.conn);
        let active = Arc::clone(&self.active);
        let flag = Arc::clone(&cancelled);
        let began = Arc::clone(&started);
        let skipped = self.timed_out(sql);

        let mut task = tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| QueryError::Connection("SQLite connection lock poisoned".to_string()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| QueryError::Connection("SQLite connection is closed".to_string()))?;
            {
                let mut current = active
                    .lock()
                    .map_err(|_| QueryError::Connection("SQLite request lock poisoned".to_string()))?;
                if flag.load(Ordering::SeqCst) {
                    return Err(skipped);
                }
                *current = Some(ticket);
                began.store(true, Ordering::SeqCst);
            }
            let result = f(conn);
            if let Ok(mut current) = active.lock() {
                *current = None;
            }
            result
        });

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => joined.map_err(|e| QueryError::execution(sql, e))?,
            Err(_) => {
                // Flag and ticket are read under the request lock so the
                // blocking side either sees the cancellation or is already running
                let ran = match self.active.lock() {
                    Ok(current) => {
                        cancelled.store(true, Ordering::SeqCst);
                        if *current == Some(ticket) {
                            warn!("SQLite statement exceeded {:?}, interrupting", self.timeout);
                            self.interrupt.interrupt();
                        }
                        started.load(Ordering::SeqCst)
                    }
                    Err(_) => return Err(QueryError::Connection("SQLite request lock poisoned".to_string())),
                };

                if !ran {
                    warn!("SQLite statement still queued after {:?}, cancelled", self.timeout);
                    return Err(self.timed_out(sql));
                }

                match task.await {
                    // finished before the interrupt landed
                    Ok(Ok(value)) => Ok(value),
                    _ => Err(self.timed_out(sql)),
                }
            }
        }
    }
}

#[async_trait]
impl ExecutionEngine for SqliteEngine {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn capabilities(&self) -> &EngineCapabilities {
        &self.capabilities
    }

    async fn execute(&self, sql: &str, params: &[QueryParam]) -> Result<ExecutionResult> {
        let owned_sql = sql.to_string();
        let params = params.to_vec();
        if returns_rows(sql) {
            self.run(sql, move |conn| query_rows(conn, &owned_sql, &params)).await
        } else {
            self.run(sql, move |conn| execute_write(conn, &owned_sql, &params)).await
        }
    }

    async fn introspect(&self, table: Option<&str>) -> Result<SchemaDescription> {
        let table = table.map(|t| t.to_string());
        self.run("PRAGMA table_info", move |conn| introspect_tables(conn, table.as_deref()))
            .await
    }

    async fn health_check(&self) -> Result<bool> {
        let checked = self
            .run("SELECT 1", |conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(|e| QueryError::execution("SELECT 1", e))
            })
            .await;
        match checked {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("SQLite health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn close(&self) {
        let closed = match self.conn.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(conn) = closed {
            if let Err((_, e)) = conn.close() {
                warn!("Error closing SQLite connection: {}", e);
            }
            info!("SQLite connection closed");
        }
    }
}

fn query_rows(conn: &Connection, sql: &str, params: &[QueryParam]) -> Result<ExecutionResult> {
    let mut stmt = conn.prepare(sql).map_err(|e| QueryError::execution(sql, e))?;
    let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
    let declared: Vec<Option<String>> = stmt
        .columns()
        .iter()
        .map(|c| c.decl_type().map(|t| t.to_string()))
        .collect();

    // Expressions have no declared type; fall back to the first non-null value's storage class
    let mut observed: Vec<Option<&'static str>> = vec![None; names.len()];
    let mut out = Vec::new();

    let mut rows = stmt.query(params_from_iter(params.iter())).map_err(|e| QueryError::execution(sql, e))?;
    while let Some(row) = rows.next().map_err(|e| QueryError::execution(sql, e))? {
        let mut record = Map::new();
        for (idx, name) in names.iter().enumerate() {
            let value = row.get_ref(idx).map_err(|e| QueryError::execution(sql, e))?;
            if observed[idx].is_none() {
                observed[idx] = storage_class(value);
            }
            record.insert(name.clone(), value_to_json(value));
        }
        out.push(record);
    }

    let columns = names
        .into_iter()
        .zip(declared)
        .zip(observed)
        .map(|((name, declared), observed)| ColumnMeta {
            name,
            engine_type: declared.or_else(|| observed.map(str::to_string)).unwrap_or_default(),
        })
        .collect();

    Ok(ExecutionResult::rows(columns, out))
}

fn execute_write(conn: &Connection, sql: &str, params: &[QueryParam]) -> Result<ExecutionResult> {
    let affected = conn
        .execute(sql, params_from_iter(params.iter()))
        .map_err(|e| QueryError::execution(sql, e))?;
    let last_insert_id = match OperationKind::from_sql(sql) {
        Some(OperationKind::Insert) => Some(conn.last_insert_rowid()),
        _ => None,
    };
    Ok(ExecutionResult::affected(affected as u64, last_insert_id))
}

fn introspect_tables(conn: &Connection, table: Option<&str>) -> Result<SchemaDescription> {
    let catalog_error = |e: rusqlite::Error| QueryError::execution("sqlite_master", e);

    let tables: Vec<String> = match table {
        Some(name) => conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(catalog_error)?
            .into_iter()
            .collect(),
        None => {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
                .map_err(catalog_error)?;
            let names = stmt
                .query_map([], |row| row.get(0))
                .map_err(catalog_error)?
                .collect::<rusqlite::Result<Vec<String>>>()
                .map_err(catalog_error)?;
            names
        }
    };

    let mut schema = SchemaDescription::new();
    for name in tables {
        let pragma = format!("PRAGMA table_info(\"{}\")", name.replace('"', "\"\""));
        let mut stmt = conn.prepare(&pragma).map_err(|e| QueryError::execution(&pragma, e))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnDescriptor {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    nullable: row.get::<_, i64>(3)? == 0,
                    default_value: row.get(4)?,
                    is_primary_key: row.get::<_, i64>(5)? > 0,
                })
            })
            .map_err(|e| QueryError::execution(&pragma, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| QueryError::execution(&pragma, e))?;
        schema.insert_table(name, columns);
    }
    Ok(schema)
}

fn storage_class(value: ValueRef<'_>) -> Option<&'static str> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(_) => Some("INTEGER"),
        ValueRef::Real(_) => Some("REAL"),
        ValueRef::Text(_) => Some("TEXT"),
        ValueRef::Blob(_) => Some("BLOB"),
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex_bytes(bytes)),
    }
}
