//! MySQL Engine - sqlx connection pool with a client-side deadline

use crate::error::{QueryError, Result};
use crate::execution::engine::{collect_row, returns_rows, with_timeout, EngineCapabilities, ExecutionEngine};
use crate::execution::params::{bind_mysql, QueryParam};
use crate::execution::result::{hex_bytes, ColumnMeta, ExecutionResult};
use crate::schema::{ColumnDescriptor, SchemaDescription};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo};
use std::time::Duration;
use tracing::{info, warn};

const COLUMNS_QUERY: &str = "SELECT CAST(TABLE_NAME AS CHAR), CAST(COLUMN_NAME AS CHAR), \
     CAST(COLUMN_TYPE AS CHAR), CAST(IS_NULLABLE AS CHAR), CAST(COLUMN_DEFAULT AS CHAR) \
     FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = DATABASE()";

pub struct MySqlEngine {
    pool: MySqlPool,
    capabilities: EngineCapabilities,
    timeout: Duration,
}

impl MySqlEngine {
    pub async fn connect(url: &str, max_connections: u32, timeout: Duration) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await
            .map_err(|e| QueryError::Connection(format!("Failed to connect to MySQL: {}", e)))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| QueryError::Connection(format!("MySQL connection test failed: {}", e)))?;

        info!("Connected to MySQL (max_connections={})", max_connections);

        Ok(Self {
            pool,
            capabilities: EngineCapabilities::mysql(),
            timeout,
        })
    }
}

fn map_error(sql: &str, error: sqlx::Error) -> QueryError {
    match error {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            QueryError::Connection(format!("MySQL: {}", error))
        }
        other => QueryError::execution(sql, other),
    }
}

#[async_trait]
impl ExecutionEngine for MySqlEngine {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn capabilities(&self) -> &EngineCapabilities {
        &self.capabilities
    }

    async fn execute(&self, sql: &str, params: &[QueryParam]) -> Result<ExecutionResult> {
        let query = bind_mysql(sqlx::query(sql), params);

        if returns_rows(sql) {
            let rows = with_timeout(sql, self.timeout, async {
                query.fetch_all(&self.pool).await.map_err(|e| map_error(sql, e))
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
                query.execute(&self.pool).await.map_err(|e| map_error(sql, e))
            })
            .await?;
            let last_insert_id = match done.last_insert_id() {
                0 => None,
                id => i64::try_from(id).ok(),
            };
            Ok(ExecutionResult::affected(done.rows_affected(), last_insert_id))
        }
    }

    async fn introspect(&self, table: Option<&str>) -> Result<SchemaDescription> {
        let sql = match table {
            Some(_) => format!("{} AND TABLE_NAME = ? ORDER BY TABLE_NAME, ORDINAL_POSITION", COLUMNS_QUERY),
            None => format!("{} ORDER BY TABLE_NAME, ORDINAL_POSITION", COLUMNS_QUERY),
        };
        let mut query = sqlx::query(&sql);
        if let Some(table) = table {
            query = query.bind(table);
        }

        let rows = with_timeout(&sql, self.timeout, async {
            query.fetch_all(&self.pool).await.map_err(|e| map_error(&sql, e))
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
                warn!("MySQL health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("MySQL pool closed");
    }
}

fn row_to_json(sql: &str, row: &MySqlRow) -> Result<Map<String, Value>> {
    collect_row(
        sql,
        row.columns().iter().enumerate().map(|(idx, column)| {
            let type_name = column.type_info().name();
            (column.name().to_string(), type_name.to_string(), column_value(row, idx, type_name))
        }),
    )
}

fn column_value(row: &MySqlRow, idx: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => decode::<bool>(row, idx)?.map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => decode::<i64>(row, idx)?.map(Value::from),
        t if t.ends_with("UNSIGNED") => decode::<u64>(row, idx)?.map(Value::from),
        "FLOAT" | "DOUBLE" => decode::<f64>(row, idx)?.map(Value::from),
        "DECIMAL" => decode::<sqlx::types::Decimal>(row, idx)?.map(|v| Value::String(v.to_string())),
        "JSON" => decode::<Value>(row, idx)?,
        "DATE" => decode::<chrono::NaiveDate>(row, idx)?.map(|v| Value::String(v.to_string())),
        "TIME" => decode::<chrono::NaiveTime>(row, idx)?.map(|v| Value::String(v.to_string())),
        "DATETIME" => decode::<chrono::NaiveDateTime>(row, idx)?.map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => {
            decode::<chrono::DateTime<chrono::Utc>>(row, idx)?.map(|v| Value::String(v.to_rfc3339()))
        }
        // YEAR arrives as a plain integer
        "YEAR" => row.try_get_unchecked::<Option<u16>, _>(idx)?.map(Value::from),
        // BIT(n) arrives as big-endian bytes
        "BIT" => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(idx)?
            .map(|bytes| Value::from(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            decode::<Vec<u8>>(row, idx)?.map(|v| Value::String(hex_bytes(&v)))
        }
        _ => match decode::<String>(row, idx) {
            Ok(text) => text.map(Value::String),
            // ENUM, SET and other textual types
            Err(_) => match row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)? {
                Some(bytes) => Some(Value::String(
                    String::from_utf8(bytes).map_err(|e| sqlx::Error::Decode(e.into()))?,
                )),
                None => None,
            },
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode<'r, T>(row: &'r MySqlRow, idx: usize) -> std::result::Result<Option<T>, sqlx::Error>
where
    T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get::<Option<T>, _>(idx)
}
