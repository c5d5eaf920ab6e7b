use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

/// Values that can be bound as query parameters or read back from a row.
///
/// One enum serves both directions so callers never touch driver types:
/// ```rust
/// use sql_bridge::prelude::*;
///
/// let params = Params::positional(vec![
///     Value::Int(1),
///     Value::Text("alice".into()),
///     Value::Bool(true),
/// ]);
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value
    Null,
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value (bound as integer 0/1)
    Bool(bool),
    /// Calendar date (bound as ISO-8601 text)
    Date(NaiveDate),
    /// Time of day (bound as ISO-8601 text)
    Time(NaiveTime),
    /// Timestamp (bound as ISO-8601 text, sub-second precision preserved)
    Timestamp(NaiveDateTime),
    /// Arbitrary-precision decimal (bound as its exact decimal text)
    Decimal(Decimal),
    /// Binary data (bound as an opaque blob, never as text)
    Blob(Vec<u8>),
    /// JSON value (bound as compact JSON text)
    Json(JsonValue),
    /// A sequence destined for an `IN (...)` predicate; expands into one
    /// engine placeholder per element at bind time.
    List(Vec<Value>),
}

impl Value {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(v) = self { Some(*v) } else { None }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let Value::Float(v) = self { Some(*v) } else { None }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(v) = self { Some(v) } else { None }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(v) = self { Some(v) } else { None }
    }

    /// Interpret this value as a timestamp, parsing stored ISO-8601 text
    /// (with either a `T` or a space separator) when necessary.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            Value::Text(s) => ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok()),
            _ => None,
        }
    }

    /// Interpret this value as a date, parsing stored ISO-8601 text when
    /// necessary.
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            Value::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(v) => Some(*v),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl Value {
    /// Build a [`Value::List`] from anything convertible to values.
    #[must_use]
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// Caller-supplied parameter shapes, resolved once at the binder boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    /// No parameters.
    #[default]
    None,
    /// Ordered values bound by ascending placeholder position.
    Positional(Vec<Value>),
    /// Keyed values bound to `:name`, `@name`, or `$name` placeholders.
    Named(HashMap<String, Value>),
}

impl Params {
    #[must_use]
    pub fn positional(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }

    /// Build a named mapping. A key may carry the placeholder's prefix
    /// character (`":id"`) or be bare (`"id"`); when both forms are present
    /// for the same placeholder, the prefixed key wins. Matching is exact
    /// and case-sensitive.
    #[must_use]
    pub fn named<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Params::Named(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Params::None => true,
            Params::Positional(v) => v.is_empty(),
            Params::Named(m) => m.is_empty(),
        }
    }
}

/// The locking mode requested at `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxBehavior {
    /// Lock acquired lazily at first write.
    Deferred,
    /// Write lock acquired at begin.
    Immediate,
    /// Deferred begin with writes rejected for the transaction's duration.
    ReadOnly,
}

impl TxBehavior {
    pub(crate) fn begin_sql(self) -> &'static str {
        match self {
            TxBehavior::Deferred | TxBehavior::ReadOnly => "BEGIN DEFERRED",
            TxBehavior::Immediate => "BEGIN IMMEDIATE",
        }
    }
}

/// Outcome of a DML execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows changed by the statement.
    pub rows_affected: usize,
    /// Rowid of the most recent successful insert on the connection.
    pub last_insert_id: i64,
}
