//! Schema description produced by backend introspection

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One column as reported by the engine catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,

    /// Engine-native type name (not normalized across engines)
    pub declared_type: String,

    pub nullable: bool,

    /// Only populated by engines whose catalog reports it (see `EngineCapabilities`)
    pub is_primary_key: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable: true,
            is_primary_key: false,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    fn is_temporal(&self) -> bool {
        let ty = self.declared_type.to_lowercase();
        ty.contains("time") || ty.contains("date")
    }
}

/// Table name -> columns in declared order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDescription {
    tables: BTreeMap<String, Vec<ColumnDescriptor>>,
}

impl SchemaDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column to a table, creating the table entry on first use
    pub fn push_column(&mut self, table: impl Into<String>, column: ColumnDescriptor) {
        self.tables.entry(table.into()).or_default().push(column);
    }

    pub fn insert_table(&mut self, table: impl Into<String>, columns: Vec<ColumnDescriptor>) {
        self.tables.insert(table.into(), columns);
    }

    pub fn with_table(mut self, table: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        self.insert_table(table, columns);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    /// Case-insensitive table lookup, returning the catalog spelling
    pub fn find_table(&self, name: &str) -> Option<(&str, &[ColumnDescriptor])> {
        self.tables
            .iter()
            .find(|(table, _)| table.eq_ignore_ascii_case(name))
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn columns(&self, table: &str) -> Option<&[ColumnDescriptor]> {
        self.find_table(table).map(|(_, cols)| cols)
    }

    /// Case-insensitive column lookup, returning the catalog spelling
    pub fn find_column(&self, table: &str, column: &str) -> Option<&str> {
        self.columns(table)?
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column))
            .map(|c| c.name.as_str())
    }

    /// Column used for recency filters on `table`.
    ///
    /// A column literally named `created_at` wins; otherwise the first
    /// temporal column whose name ends in `_at`. Other date columns
    /// (`birth_date`, `due_on`) are never used.
    pub fn timestamp_column(&self, table: &str) -> Option<&str> {
        let columns = self.columns(table)?;
        columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case("created_at"))
            .or_else(|| {
                columns
                    .iter()
                    .find(|c| c.name.to_lowercase().ends_with("_at") && c.is_temporal())
            })
            .map(|c| c.name.as_str())
    }
}
