//! PostgreSQL Engine - sqlx connection pool
//!
//! Server-side `statement_timeout` is set on every pooled connection and a
//! client-side deadline covers pool acquisition and network stalls.

use crate::error::{QueryError, Result};
use crate::execution::engine::{collect_row, returns_rows, with_timeout, EngineCapabilities, ExecutionEngine};
use crate::execution::params::{bind_postgres, QueryParam};
use crate::execution::result::{hex_bytes, ColumnMeta, ExecutionResult};
use crate::schema::{ColumnDescriptor, SchemaDescription};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::types::{PgInterval, PgMoney};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgValueFormat};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// SQLSTATE for query_canceled (raised when statement_timeout fires)
const QUERY_CANCELED: &str = "57014";

const COLUMNS_QUERY: &str = "SELECT table_name::text, column_name::text, data_type::text, \
     is_nullable::text, column_default::text \
     FROM information_schema.columns WHERE table_schema = 'public'";

pub struct PostgresEngine {
    pool: PgPool,
    capabilities: EngineCapabilities,
    timeout: Duration,
}

impl PostgresEngine {
    /// Create the pool and verify it with a round-trip; failure is fatal to startup
    pub async fn connect(url: &str, max_connections: u32, timeout: Duration) -> Result<Self> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| QueryError::Configuration(format!("Invalid PostgreSQL URL: {}", e)))?
            .options([("statement_timeout", timeout.as_millis().to_string())]);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| QueryError::Connection(format!("Failed to connect to PostgreSQL: {}", e)))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| QueryError::Connection(format!("PostgreSQL connection test failed: {}", e)))?;

        info!("Connected to PostgreSQL (max_connections={})", max_connections);

        Ok(Self {
            pool,
            capabilities: EngineCapabilities::postgres(),
            timeout,
        })
    }

    fn map_error(&self, sql: &str, error: sqlx::Error) -> QueryError {
        match error {
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some(QUERY_CANCELED) => QueryError::Timeout {
                sql: sql.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            },
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                QueryError::Connection(format!("PostgreSQL: {}", error))
            }
            other => QueryError::execution(sql, other),
        }
    }
}

#[async_trait]
impl ExecutionEngine for PostgresEngine {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> &EngineCapabilities {
        &self.capabilities
    }

    async fn execute(&self, sql: &str, params: &[QueryParam]) -> Result<ExecutionResult> {
        let query = bind_postgres(sqlx::query(sql), params);

        if returns_rows(sql) {
            let rows = with_timeout(sql, self.timeout, async {
                query.fetch_all(&self.pool).await.map_err(|e| self.map_error(sql, e))
            })
            .await?;

            let columns = rows
                .first()
                .map(|row| {
                    row.columns()
                        .iter()
                        .map(|c| ColumnMeta {
                            name: c.name().to_string(),
                            engine_type: c.type_info().name().to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            let rows = rows.iter().map(|row| row_to_json(sql, row)).collect::<Result<Vec<_>>>()?;
            Ok(ExecutionResult::rows(columns, rows))
        } else {
            let done = with_timeout(sql, self.timeout, async {
                query.execute(&self.pool).await.map_err(|e| self.map_error(sql, e))
            })
            .await?;
            Ok(ExecutionResult::affected(done.rows_affected(), None))
        }
    }

    async fn introspect(&self, table: Option<&str>) -> Result<SchemaDescription> {
        let sql = match table {
            Some(_) => format!("{} AND table_name = $1 ORDER BY table_name, ordinal_position", COLUMNS_QUERY),
            None => format!("{} ORDER BY table_name, ordinal_position", COLUMNS_QUERY),
        };
        let mut query = sqlx::query(&sql);
        if let Some(table) = table {
            query = query.bind(table);
        }

        let rows = with_timeout(&sql, self.timeout, async {
            query.fetch_all(&self.pool).await.map_err(|e| self.map_error(&sql, e))
        })
        .await?;

        let mut schema = SchemaDescription::new();
        for row in rows {
            let table_name: String = row.try_get(0).map_err(|e| QueryError::execution(&sql, e))?;
            let column = ColumnDescriptor {
                name: row.try_get(1).map_err(|e| QueryError::execution(&sql, e))?,
                declared_type: row.try_get(2).map_err(|e| QueryError::execution(&sql, e))?,
                nullable: row.try_get::<String, _>(3).map(|v| v == "YES").unwrap_or(true),
                is_primary_key: false,
                default_value: row.try_get(4).unwrap_or(None),
            };
            schema.push_column(table_name, column);
        }
        Ok(schema)
    }

    async fn health_check(&self) -> Result<bool> {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("PostgreSQL health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

/// Decode one row by the column's PostgreSQL type name. A value that cannot
/// be decoded fails the statement rather than reading as NULL.
fn row_to_json(sql: &str, row: &PgRow) -> Result<Map<String, Value>> {
    collect_row(
        sql,
        row.columns().iter().enumerate().map(|(idx, column)| {
            let type_name = column.type_info().name();
            (column.name().to_string(), type_name.to_string(), column_value(row, idx, type_name))
        }),
    )
}

fn column_value(row: &PgRow, idx: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => decode::<bool>(row, idx)?.map(Value::Bool),
        "INT2" => decode::<i16>(row, idx)?.map(Value::from),
        "INT4" => decode::<i32>(row, idx)?.map(Value::from),
        "INT8" => decode::<i64>(row, idx)?.map(Value::from),
        "FLOAT4" => decode::<f32>(row, idx)?.map(|v| Value::from(f64::from(v))),
        "FLOAT8" => decode::<f64>(row, idx)?.map(Value::from),
        "NUMERIC" => decode::<sqlx::types::Decimal>(row, idx)?.map(|v| Value::String(v.to_string())),
        "MONEY" => decode::<PgMoney>(row, idx)?.map(|v| Value::String(v.to_decimal(2).to_string())),
        "UUID" => decode::<uuid::Uuid>(row, idx)?.map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => decode::<Value>(row, idx)?,
        "DATE" => decode::<chrono::NaiveDate>(row, idx)?.map(|v| Value::String(v.to_string())),
        "TIME" => decode::<chrono::NaiveTime>(row, idx)?.map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => decode::<chrono::NaiveDateTime>(row, idx)?.map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => {
            decode::<chrono::DateTime<chrono::Utc>>(row, idx)?.map(|v| Value::String(v.to_rfc3339()))
        }
        "INTERVAL" => decode::<PgInterval>(row, idx)?.map(|v| {
            serde_json::json!({ "months": v.months, "days": v.days, "microseconds": v.microseconds })
        }),
        "BYTEA" => decode::<Vec<u8>>(row, idx)?.map(|v| Value::String(hex_bytes(&v))),
        "BOOL[]" => decode::<Vec<bool>>(row, idx)?.map(Value::from),
        "INT2[]" => decode::<Vec<i16>>(row, idx)?.map(Value::from),
        "INT4[]" => decode::<Vec<i32>>(row, idx)?.map(Value::from),
        "INT8[]" => decode::<Vec<i64>>(row, idx)?.map(Value::from),
        "FLOAT4[]" => decode::<Vec<f32>>(row, idx)?.map(Value::from),
        "FLOAT8[]" => decode::<Vec<f64>>(row, idx)?.map(Value::from),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => decode::<Vec<String>>(row, idx)?.map(Value::from),
        _ => return text_value(row, idx),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Textual types, or any value the server sent in text format
fn text_value(row: &PgRow, idx: usize) -> std::result::Result<Value, sqlx::Error> {
    if let Ok(text) = decode::<String>(row, idx) {
        return Ok(text.map(Value::String).unwrap_or(Value::Null));
    }
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    if raw.format() != PgValueFormat::Text {
        return Err(sqlx::Error::Decode("no JSON mapping for binary value".into()));
    }
    raw.as_str()
        .map(|s| Value::String(s.to_string()))
        .map_err(sqlx::Error::Decode)
}

fn decode<'r, T>(row: &'r PgRow, idx: usize) -> std::result::Result<Option<T>, sqlx::Error>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(idx)
}
