//! Value types for dbarchive-source
//!
//! Two layers of values:
//! - [`RawValue`]: what a connection hands back off the wire, before any
//!   interpretation of the declared column type
//! - [`Value`]: the decoded, statically typed column value handed to the sink,
//!   with an explicit [`Value::Null`] marker that is never a zero sentinel

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Decoded column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Signed integer (all signed integer families and narrow unsigned ones)
    Int64(i64),
    /// Unsigned 64-bit integer (BIGINT UNSIGNED)
    UInt64(u64),
    /// Floating point (FLOAT, DOUBLE, DECIMAL)
    Float64(f64),
    /// Text (character and temporal families, unrecognized types)
    String(String),
    /// Boolean value
    Bool(bool),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float64(_) => "Float64",
            Self::String(_) => "String",
            Self::Bool(_) => "Bool",
        }
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(n) => Some(*n),
            Self::UInt64(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Try to convert to u64
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt64(n) => Some(*n),
            Self::Int64(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(n) => Some(*n),
            Self::Int64(n) => Some(*n as f64),
            Self::UInt64(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Try to borrow as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to convert to bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

/// Undecoded value as returned by a connection
///
/// Mirrors what the MySQL text and binary protocols can deliver. The text
/// protocol sends every non-NULL value as [`RawValue::Bytes`].
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum RawValue {
    Null,
    Bytes(Vec<u8>),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    /// DATE / DATETIME / TIMESTAMP components
    Date {
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        micros: u32,
    },
    /// TIME components (may be negative and exceed 24 hours)
    Time {
        negative: bool,
        days: u32,
        hours: u8,
        minutes: u8,
        seconds: u8,
        micros: u32,
    },
}

impl RawValue {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convenience constructor for a text-protocol value
    pub fn text(s: impl AsRef<str>) -> Self {
        Self::Bytes(s.as_ref().as_bytes().to_vec())
    }
}

impl fmt::Display for RawValue {
    /// Renders the value the way the source prints it; dates use the
    /// `YYYY-MM-DD HH:MM:SS[.ffffff]` layout.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Self::Int(n) => write!(f, "{n}"),
            Self::UInt(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Double(n) => write!(f, "{n}"),
            Self::Date {
                year,
                month,
                day,
                hour,
                minute,
                second,
                micros,
            } => {
                write!(
                    f,
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                )?;
                if *micros > 0 {
                    write!(f, ".{micros:06}")?;
                }
                Ok(())
            }
            Self::Time {
                negative,
                days,
                hours,
                minutes,
                seconds,
                micros,
            } => {
                let sign = if *negative { "-" } else { "" };
                let total_hours = days * 24 + u32::from(*hours);
                write!(f, "{sign}{total_hours:02}:{minutes:02}:{seconds:02}")?;
                if *micros > 0 {
                    write!(f, ".{micros:06}")?;
                }
                Ok(())
            }
        }
    }
}

/// Column metadata reported alongside a result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    /// Column name
    pub name: String,
    /// Source-declared type name (e.g. `UNSIGNED BIGINT`, `VARCHAR`)
    pub type_name: String,
    /// Column ordinal (0-based position in the result set)
    pub ordinal: usize,
}

impl ColumnMetadata {
    /// Create column metadata
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ordinal: 0,
        }
    }

    /// Set the ordinal
    pub fn with_ordinal(mut self, ordinal: usize) -> Self {
        self.ordinal = ordinal;
        self
    }
}

/// Rows and column metadata returned by one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column metadata in result order
    pub columns: Vec<ColumnMetadata>,
    /// Raw rows, each with one value per column
    pub rows: Vec<Vec<RawValue>>,
}

impl ResultSet {
    /// Create a result set
    pub fn new(columns: Vec<ColumnMetadata>, rows: Vec<Vec<RawValue>>) -> Self {
        Self { columns, rows }
    }

    /// Single-column result set, handy for `SHOW ...` style statements
    pub fn single_column(
        name: impl Into<String>,
        type_name: impl Into<String>,
        values: impl IntoIterator<Item = RawValue>,
    ) -> Self {
        Self {
            columns: vec![ColumnMetadata::new(name, type_name)],
            rows: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    /// Column names in result order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Number of rows
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take the first row, if any
    pub fn into_first_row(self) -> Option<Vec<RawValue>> {
        self.rows.into_iter().next()
    }
}

/// One extracted row, values in the query's column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a row
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row into its values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Output of one extraction call
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Column names in source order
    pub columns: Vec<String>,
    /// Decoded rows
    pub rows: Vec<Row>,
    /// Wall time spent on the call
    pub elapsed: Duration,
}

impl Extraction {
    /// Number of rows extracted
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if nothing was extracted
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name (case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value of `column` in row `row`
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}
