use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Could not translate '{text}': no supported intent matches")]
    UnrecognizedIntent { text: String },

    #[error("Could not translate '{text}': no table reference found")]
    UnresolvedTable { text: String },

    #[error("Could not translate: column '{column}' does not exist in table '{table}'")]
    UnresolvedColumn { table: String, column: String },

    #[error("Validation rejected SQL `{sql}`: {}", errors.join("; "))]
    ValidationRejected { sql: String, errors: Vec<String> },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Execution failed for `{sql}`: {message}")]
    Execution { sql: String, message: String },

    #[error("Query timed out after {timeout_ms}ms: `{sql}`")]
    Timeout { sql: String, timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    /// Pipeline stage that produced the error.
    pub fn stage(&self) -> &'static str {
        match self {
            QueryError::Configuration(_) | QueryError::Io(_) | QueryError::Json(_) => "configuration",
            QueryError::UnrecognizedIntent { .. }
            | QueryError::UnresolvedTable { .. }
            | QueryError::UnresolvedColumn { .. } => "translation",
            QueryError::ValidationRejected { .. } => "validation",
            QueryError::Connection(_) => "connection",
            QueryError::Execution { .. } | QueryError::Timeout { .. } => "execution",
        }
    }

    /// Offending SQL text, when the failure happened after SQL existed.
    pub fn sql(&self) -> Option<&str> {
        match self {
            QueryError::ValidationRejected { sql, .. }
            | QueryError::Execution { sql, .. }
            | QueryError::Timeout { sql, .. } => Some(sql),
            _ => None,
        }
    }

    pub(crate) fn execution(sql: &str, message: impl ToString) -> Self {
        QueryError::Execution {
            sql: sql.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
