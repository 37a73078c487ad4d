//! Query Pipeline - translate, validate, execute
//!
//! Every SQL string passes the validator before it reaches the executor,
//! whether it came from the translator or from the caller. A rejected
//! verdict is returned as `QueryError::ValidationRejected` and never executed.

use crate::config::EngineConfig;
use crate::error::{QueryError, Result};
use crate::execution::{ColumnMeta, ExecutionResult, QueryExecutor, QueryParam};
use crate::schema::SchemaDescription;
use crate::translator::{OperationKind, TranslationResult, Translator};
use crate::validation::{SqlValidator, ValidationVerdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlQueryRequest {
    pub query: String,
    #[serde(default)]
    pub confirm_destructive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawQueryRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
    #[serde(default)]
    pub confirm_destructive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRequest {
    #[serde(default)]
    pub table_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub sql: String,
}

/// Outcome of an executed statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub request_id: Uuid,
    pub sql: String,
    pub operation_kind: Option<OperationKind>,
    pub warnings: Vec<String>,
    pub row_count: usize,
    pub rows: Vec<Map<String, Value>>,
    pub columns: Vec<ColumnMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
    pub executed_at: DateTime<Utc>,
}

impl QueryResponse {
    fn new(
        request_id: Uuid,
        sql: String,
        operation_kind: Option<OperationKind>,
        warnings: Vec<String>,
        result: ExecutionResult,
    ) -> Self {
        Self {
            request_id,
            sql,
            operation_kind,
            warnings,
            row_count: result.row_count,
            rows: result.rows,
            columns: result.columns,
            last_insert_id: result.last_insert_id,
            executed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub schema: SchemaDescription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub accepted: bool,
    pub is_destructive: bool,
    pub complexity_score: u32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub operation: String,
}

impl From<ValidationVerdict> for ValidateResponse {
    fn from(verdict: ValidationVerdict) -> Self {
        Self {
            accepted: verdict.accepted,
            is_destructive: verdict.is_destructive,
            complexity_score: verdict.complexity_score,
            errors: verdict.errors,
            warnings: verdict.warnings,
            operation: verdict.operation,
        }
    }
}

pub struct QueryPipeline {
    translator: Translator,
    validator: SqlValidator,
    executor: Arc<QueryExecutor>,
    log_queries: bool,
}

impl QueryPipeline {
    /// Translator dialect follows the connected engine
    pub fn new(config: &EngineConfig, executor: Arc<QueryExecutor>) -> Self {
        Self {
            translator: Translator::new(executor.dialect()).with_timestamp_overrides(&config.timestamp_columns),
            validator: SqlValidator::from_config(config),
            executor,
            log_queries: config.log_queries,
        }
    }

    pub fn from_parts(translator: Translator, validator: SqlValidator, executor: Arc<QueryExecutor>) -> Self {
        Self {
            translator,
            validator,
            executor,
            log_queries: true,
        }
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    /// Translate against the current schema without validating or executing
    pub async fn translate(&self, text: &str) -> Result<TranslationResult> {
        let schema = self.executor.schema(None).await?;
        self.translator.translate(text, &schema)
    }

    pub async fn natural_language(&self, request: NlQueryRequest) -> Result<QueryResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!("nl_query", request_id = %request_id);

        async {
            let translation = self.translate(&request.query).await?;
            if self.log_queries {
                info!(
                    "Translated '{}' -> {} ({})",
                    request.query, translation.generated_sql, translation.operation_kind
                );
            }

            let verdict = self.check(&translation.generated_sql, request.confirm_destructive)?;
            let result = self.executor.execute(&translation.generated_sql, &[]).await?;

            let mut warnings = translation.warnings;
            warnings.extend(verdict.warnings);
            Ok::<_, QueryError>(QueryResponse::new(
                request_id,
                translation.generated_sql,
                Some(translation.operation_kind),
                warnings,
                result,
            ))
        }
        .instrument(span)
        .await
        .map_err(|e| self.log_failure(e))
    }

    pub async fn raw_sql(&self, request: RawQueryRequest) -> Result<QueryResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!("raw_query", request_id = %request_id);

        async {
            let verdict = self.check(&request.sql, request.confirm_destructive)?;
            let result = self.executor.execute(&request.sql, &request.params).await?;
            Ok::<_, QueryError>(QueryResponse::new(
                request_id,
                request.sql.clone(),
                OperationKind::from_sql(&request.sql),
                verdict.warnings,
                result,
            ))
        }
        .instrument(span)
        .await
        .map_err(|e| self.log_failure(e))
    }

    pub async fn schema(&self, request: SchemaRequest) -> Result<SchemaResponse> {
        let schema = self.executor.schema(request.table_name.as_deref()).await?;
        Ok(SchemaResponse {
            schema: schema.as_ref().clone(),
        })
    }

    /// Verdict only; nothing is executed
    pub fn validate(&self, request: ValidateRequest) -> ValidateResponse {
        self.validator.validate(&request.sql, false).into()
    }

    fn check(&self, sql: &str, confirm_destructive: bool) -> Result<ValidationVerdict> {
        let verdict = self.validator.validate(sql, confirm_destructive);
        if verdict.accepted {
            Ok(verdict)
        } else {
            Err(QueryError::ValidationRejected {
                sql: sql.to_string(),
                errors: verdict.errors,
            })
        }
    }

    fn log_failure(&self, error: QueryError) -> QueryError {
        warn!("Request failed at {} stage: {}", error.stage(), error);
        error
    }
}
