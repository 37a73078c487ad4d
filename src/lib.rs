pub mod config;
pub mod error;
pub mod execution;
pub mod pipeline;
pub mod schema;
pub mod schema_cache;
pub mod translator;
pub mod validation;

// Re-export the types most callers need
pub use config::{BackendConfig, EngineConfig, SafetySettings};
pub use error::{QueryError, Result};
pub use execution::{ExecutionEngine, ExecutionResult, QueryExecutor, QueryParam};
pub use pipeline::{
    NlQueryRequest, QueryPipeline, QueryResponse, RawQueryRequest, SchemaRequest, SchemaResponse,
    ValidateRequest, ValidateResponse,
};
pub use schema::{ColumnDescriptor, SchemaDescription};
pub use schema_cache::SchemaCache;
pub use translator::{OperationKind, SqlDialect, TranslationResult, Translator};
pub use validation::{SqlValidator, ValidationVerdict};
