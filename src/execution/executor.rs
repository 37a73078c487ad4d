//! Query Executor - one engine per process plus the schema cache
//!
//! The engine is chosen from configuration once at startup; everything
//! after that goes through the `ExecutionEngine` trait.

use crate::config::{BackendConfig, EngineConfig};
use crate::error::Result;
use crate::execution::engine::{EngineCapabilities, ExecutionEngine};
use crate::execution::mysql_engine::MySqlEngine;
use crate::execution::params::QueryParam;
use crate::execution::postgres_engine::PostgresEngine;
use crate::execution::result::ExecutionResult;
use crate::execution::sqlite_engine::SqliteEngine;
use crate::schema::SchemaDescription;
use crate::schema_cache::{CacheKey, SchemaCache};
use crate::translator::SqlDialect;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct QueryExecutor {
    engine: Arc<dyn ExecutionEngine>,
    cache: SchemaCache,
    log_queries: bool,
}

impl QueryExecutor {
    /// Connect the configured backend. Failure here is fatal; there is no lazy retry.
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.query_timeout();

        let engine: Arc<dyn ExecutionEngine> = match &config.backend {
            BackendConfig::Postgres { url, max_connections } => {
                Arc::new(PostgresEngine::connect(url, *max_connections, timeout).await?)
            }
            BackendConfig::Mysql { url, max_connections } => {
                Arc::new(MySqlEngine::connect(url, *max_connections, timeout).await?)
            }
            BackendConfig::Sqlite { path } => Arc::new(SqliteEngine::open(path, timeout)?),
        };

        info!(
            "Execution engine ready: {} (schema cache {}, ttl {:?})",
            engine.name(),
            if config.enable_schema_cache { "on" } else { "off" },
            config.schema_cache_ttl()
        );

        Ok(Self {
            engine,
            cache: SchemaCache::new(config.enable_schema_cache, config.schema_cache_ttl()),
            log_queries: config.log_queries,
        })
    }

    /// Wrap an already-open engine
    pub fn from_engine(engine: Arc<dyn ExecutionEngine>, cache: SchemaCache) -> Self {
        Self {
            engine,
            cache,
            log_queries: true,
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn capabilities(&self) -> &EngineCapabilities {
        self.engine.capabilities()
    }

    pub fn dialect(&self) -> SqlDialect {
        self.engine.capabilities().dialect
    }

    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> Result<ExecutionResult> {
        if self.log_queries {
            info!("Executing on {}: {}", self.engine.name(), sql);
        }
        let start = Instant::now();
        let result = self.engine.execute(sql, params).await?;
        debug!("{} row(s) in {}ms", result.row_count, start.elapsed().as_millis());
        Ok(result)
    }

    /// Schema for one table or all tables, served from the cache when enabled
    pub async fn schema(&self, table: Option<&str>) -> Result<Arc<SchemaDescription>> {
        let engine = Arc::clone(&self.engine);
        let owned = table.map(|t| t.to_string());
        self.cache
            .get_or_load(CacheKey::for_request(table), || async move {
                engine.introspect(owned.as_deref()).await
            })
            .await
    }

    /// Drop cached schema for one table, or everything
    pub fn refresh_schema(&self, table: Option<&str>) {
        match table {
            Some(_) => {
                self.cache.invalidate(&CacheKey::for_request(table));
                self.cache.invalidate(&CacheKey::AllTables);
            }
            None => self.cache.clear(),
        }
        info!("Schema cache refreshed ({})", table.unwrap_or("all tables"));
    }

    pub async fn health_check(&self) -> Result<bool> {
        self.engine.health_check().await
    }

    /// Release the engine's connections; safe to call more than once
    pub async fn shutdown(&self) {
        self.engine.close().await;
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use std::time::Duration;

    async fn executor() -> QueryExecutor {
        let engine = SqliteEngine::open(":memory:", Duration::from_secs(5)).unwrap();
        let executor = QueryExecutor::from_engine(Arc::new(engine), SchemaCache::new(true, None));
        executor
            .execute("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)", &[])
            .await
            .unwrap();
        executor
    }

    #[tokio::test]
    async fn test_schema_is_cached_until_refreshed() {
        let executor = executor().await;
        let first = executor.schema(Some("items")).await.unwrap();
        assert_eq!(first.columns("items").unwrap().len(), 2);

        executor.execute("ALTER TABLE items ADD COLUMN price REAL", &[]).await.unwrap();
        let cached = executor.schema(Some("items")).await.unwrap();
        assert_eq!(cached.columns("items").unwrap().len(), 2);

        executor.refresh_schema(Some("items"));
        let fresh = executor.schema(Some("items")).await.unwrap();
        assert_eq!(fresh.columns("items").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_dialect_follows_engine() {
        let executor = executor().await;
        assert_eq!(executor.dialect(), SqlDialect::Sqlite);
        assert_eq!(executor.engine_name(), "sqlite");
        assert!(executor.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_closes_engine() {
        let executor = executor().await;
        executor.shutdown().await;
        executor.shutdown().await;
        let err = executor.execute("SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err.stage(), "connection");
        assert!(matches!(err, QueryError::Connection(_)));
    }

    #[tokio::test]
    async fn test_connect_sqlite_from_config() {
        let config = EngineConfig::new(BackendConfig::Sqlite { path: ":memory:".to_string() });
        let executor = QueryExecutor::connect(&config).await.unwrap();
        assert_eq!(executor.engine_name(), "sqlite");
        assert!(executor.schema(None).await.unwrap().is_empty());
    }
}
