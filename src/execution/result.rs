//! Execution Result - Normalized output of every backend adapter

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result column with the engine's native type name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub engine_type: String,
}

/// Row data (for reads) or affected-row count (for writes)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// One JSON object per row, keyed by column name
    pub rows: Vec<Map<String, Value>>,

    /// Rows returned for reads, rows affected for writes
    pub row_count: usize,

    pub columns: Vec<ColumnMeta>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
}

impl ExecutionResult {
    pub fn rows(columns: Vec<ColumnMeta>, rows: Vec<Map<String, Value>>) -> Self {
        Self {
            row_count: rows.len(),
            rows,
            columns,
            last_insert_id: None,
        }
    }

    pub fn affected(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows: Vec::new(),
            row_count: rows_affected as usize,
            columns: Vec::new(),
            last_insert_id,
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Lowercase hex with a `\x` prefix, the way PostgreSQL prints bytea
pub(crate) fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
