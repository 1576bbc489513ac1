use std::collections::BTreeMap;

use serde::Serialize;

use crate::{ColumnType, Value};

/// One result as returned by a backend client, before normalization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawResult {
    /// Column labels as reported by the backend; may contain duplicates.
    pub columns: Vec<String>,
    /// Declared type per column, aligned with `columns`.
    pub column_types: Vec<Option<String>>,
    /// Positional rows aligned with `columns`.
    pub rows: Vec<Vec<Value>>,
    pub stats: RawStats,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawStats {
    pub rows_affected: u64,
    pub rows_read: Option<u64>,
    pub rows_written: Option<u64>,
    pub query_duration_ms: Option<f64>,
    /// Last inserted row id as decimal text, untruncated.
    pub last_insert_rowid: Option<String>,
}

/// Canonical column header of a [`QueryResultSet`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Collision-free key into each [`Row`].
    pub name: String,
    /// Label as returned by the backend.
    pub display_name: String,
    pub original_type: Option<String>,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Row values keyed by [`Header::name`].
pub type Row = BTreeMap<String, Value>;

/// Fixed-shape statistics; unsupported fields serialize as `null`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    pub rows_affected: u64,
    pub rows_read: Option<u64>,
    pub rows_written: Option<u64>,
    pub query_duration_ms: Option<f64>,
}

/// Canonical result of one executed statement.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultSet {
    pub headers: Vec<Header>,
    pub rows: Vec<Row>,
    #[serde(rename = "stat")]
    pub stats: QueryStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_rowid: Option<Value>,
}

impl QueryResultSet {
    /// Value of the first row under the internal column name `name`.
    pub fn first_value(&self, name: &str) -> Option<&Value> {
        self.rows.first()?.get(name)
    }
}
