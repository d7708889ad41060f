//! Tabular data exchanged with the enterprise backend

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of named columns
pub type BackendRow = HashMap<String, String>;

/// A named-column table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendTable {
    pub rows: Vec<BackendRow>,
}

impl BackendTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with a single column populated from `values`
    pub fn single_column<I, S>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = values
            .into_iter()
            .map(|v| {
                let mut row = BackendRow::new();
                row.insert(column.to_string(), v.into());
                row
            })
            .collect();
        Self { rows }
    }

    /// Append a row built from `(column, value)` pairs
    pub fn push_row<I, K, V>(&mut self, cells: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.rows
            .push(cells.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Import parameters of a backend function call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendImports {
    pub scalars: HashMap<String, String>,
    pub tables: HashMap<String, BackendTable>,
}

impl BackendImports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.scalars.insert(name.into(), value.into());
        self
    }

    pub fn with_table(mut self, name: impl Into<String>, table: BackendTable) -> Self {
        self.tables.insert(name.into(), table);
        self
    }
}

/// Export tables of a backend function call.
///
/// An empty response (no tables at all) is what unrecognized handlers produce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub tables: HashMap<String, BackendTable>,
}

impl BackendResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, table: BackendTable) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    pub fn table(&self, name: &str) -> Option<&BackendTable> {
        self.tables.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
