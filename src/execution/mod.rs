//! Execution Module - one contract over three backends
//!
//! - `ExecutionEngine` trait with capability descriptions
//! - Adapters for PostgreSQL and MySQL (sqlx pools) and SQLite (rusqlite)
//! - `QueryExecutor` owning the configured engine and the schema cache

pub mod engine;
pub mod executor;
pub mod params;
pub mod result;

// Backend adapters
pub mod mysql_engine;
pub mod postgres_engine;
pub mod sqlite_engine;

pub use engine::{is_select, returns_rows, EngineCapabilities, ExecutionEngine, PlaceholderStyle};
pub use executor::QueryExecutor;
pub use mysql_engine::MySqlEngine;
pub use params::QueryParam;
pub use postgres_engine::PostgresEngine;
pub use result::{ColumnMeta, ExecutionResult};
pub use sqlite_engine::SqliteEngine;
