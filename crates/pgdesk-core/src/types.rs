//! Core types for PgDesk

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A database value as handed over by the database service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// Decimal/Numeric (stored as string for precision)
    Decimal(String),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// UUID
    Uuid(Uuid),
    /// Date
    Date(NaiveDate),
    /// DateTime without timezone
    DateTime(NaiveDateTime),
    /// DateTime with timezone (UTC)
    DateTimeUtc(DateTime<Utc>),
    /// JSON value
    Json(serde_json::Value),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::DateTimeUtc(v) => write!(f, "{}", v),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

/// Identity of a displayed row.
///
/// Identity is assigned when the row enters the grid and is replaced when the
/// row is rewritten by an update, since primary-key edits change what the row is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowId(pub Uuid);

impl RowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A row of a result grid
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// Row identity within the displayed grid
    pub id: RowId,
    /// Column values keyed by column name
    pub values: HashMap<String, Value>,
}

impl TableRow {
    /// Create a row with a fresh identity
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self {
            id: RowId::new(),
            values,
        }
    }

    /// Build a row from parallel column/value lists
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Produce the row that results from applying `new_values`, under a new identity.
    pub fn with_values(&self, new_values: &HashMap<String, Value>) -> Self {
        let mut values = self.values.clone();
        for (column, value) in new_values {
            values.insert(column.clone(), value.clone());
        }
        Self::new(values)
    }

    /// Primary key values in key order; `None` if any key column is missing.
    pub fn primary_key_values(&self, primary_key_columns: &[String]) -> Option<Vec<(String, Value)>> {
        primary_key_columns
            .iter()
            .map(|col| self.values.get(col).map(|v| (col.clone(), v.clone())))
            .collect()
    }
}

/// Output of a fetch or free-form execution
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    /// Result rows
    pub rows: Vec<TableRow>,
    /// Column names in display order
    pub column_names: Vec<String>,
    /// Rows affected (for DML statements)
    pub affected_rows: Option<u64>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryOutput {
    /// Create a result with rows
    pub fn with_rows(column_names: Vec<String>, rows: Vec<TableRow>) -> Self {
        Self {
            rows,
            column_names,
            affected_rows: None,
            execution_time_ms: 0,
        }
    }

    /// Create a result for a statement that only affected rows
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            affected_rows: Some(rows_affected),
            ..Self::default()
        }
    }

    /// Check if the result has rows
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }
}
