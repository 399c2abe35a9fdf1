//! Result types for sqlrun.
//!
//! Defines the immutable snapshots handed to result sinks: column metadata,
//! rows of normalized cell values, and complete buffered result sets.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a single normalized value from a result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// 32-bit signed integer.
    Int(i32),

    /// 64-bit signed integer.
    Long(i64),

    /// Floating point number.
    Float(f64),

    /// Exact decimal in its textual form.
    Decimal(String),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Calendar date without time zone.
    Date(NaiveDate),

    /// Time of day without time zone.
    Time(NaiveTime),

    /// Date and time without time zone.
    DateTime(NaiveDateTime),

    /// A driver-specific value with no canonical mapping, in the driver's textual form.
    Native(String),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Attempts to convert the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Long(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Decimal(d) => d.clone(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
            Value::Date(d) => d.to_string(),
            Value::Time(t) => t.to_string(),
            Value::DateTime(dt) => dt.to_string(),
            Value::Native(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

/// A cell value as read from the database driver, before normalization.
///
/// Temporal values keep the driver's own representation here; only
/// [`normalize`](crate::db::normalize) turns them into [`Value`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverValue {
    /// A value that needs no conversion.
    Plain(Value),

    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),

    /// Timestamp with time zone, as an instant.
    TimestampTz(DateTime<Utc>),

    /// Date column value.
    Date(NaiveDate),

    /// Time column value.
    Time(NaiveTime),
}

impl DriverValue {
    /// The driver's NULL.
    pub fn null() -> Self {
        DriverValue::Plain(Value::Null)
    }
}

impl From<Value> for DriverValue {
    fn from(v: Value) -> Self {
        DriverValue::Plain(v)
    }
}

/// Metadata about one column in a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    type_name: String,
    display_name: String,
    display_size: u32,
}

impl ColumnDescriptor {
    /// Creates a column descriptor.
    pub fn new(
        type_name: impl Into<String>,
        display_name: impl Into<String>,
        display_size: u32,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            display_name: display_name.into(),
            display_size,
        }
    }

    /// Database type name as reported by the driver.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Column label.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Maximum width in characters of the column's values.
    pub fn display_size(&self) -> u32 {
        self.display_size
    }
}

/// Ordered column metadata for one result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSet(Vec<ColumnDescriptor>);

impl ColumnSet {
    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the column at `index` (0-based).
    pub fn get(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnDescriptor> {
        self.0.iter()
    }

    /// Column labels in order.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(ColumnDescriptor::display_name).collect()
    }
}

impl From<Vec<ColumnDescriptor>> for ColumnSet {
    fn from(columns: Vec<ColumnDescriptor>) -> Self {
        Self(columns)
    }
}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a ColumnDescriptor;
    type IntoIter = std::slice::Iter<'a, ColumnDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One row of normalized values.
///
/// The length is fixed when the row is read. It is not checked against the
/// column metadata of the result set it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowSnapshot(Vec<Value>);

impl RowSnapshot {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the value at `index` (0-based).
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for RowSnapshot {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// A complete row-returning result, read eagerly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    columns: ColumnSet,
    rows: Vec<RowSnapshot>,
}

impl ResultSnapshot {
    /// Creates a result snapshot from columns and rows.
    pub fn new(columns: ColumnSet, rows: Vec<RowSnapshot>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn rows(&self) -> &[RowSnapshot] {
        &self.rows
    }

    /// Number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (ColumnSet, Vec<RowSnapshot>) {
        (self.columns, self.rows)
    }
}
