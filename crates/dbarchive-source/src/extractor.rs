//! Row extraction with per-column type fidelity
//!
//! The declared type name of every result column is normalized to a
//! [`ColumnFamily`] once per query, and each family maps to exactly one
//! [`DecodeStrategy`]. The mapping is total: unrecognized types fall back to
//! raw text. What can fail is the value itself (e.g. letters in an integer
//! column); one such value fails the whole call and no rows are returned.
//!
//! | declared type                                   | family        | value     |
//! |-------------------------------------------------|---------------|-----------|
//! | TINYINT .. BIGINT, narrow UNSIGNED ints         | Integer       | `Int64`   |
//! | UNSIGNED BIGINT                                 | UnsignedWide  | `UInt64`  |
//! | FLOAT, DOUBLE, REAL, DECIMAL, NUMERIC           | Floating      | `Float64` |
//! | CHAR, VARCHAR, TEXT family                      | Character     | `String`  |
//! | DATE, TIME, DATETIME, TIMESTAMP                 | Temporal      | `String`  |
//! | BOOL, BOOLEAN                                   | Boolean       | `Bool`    |
//! | anything else (YEAR, JSON, BLOB, ...)           | Unrecognized  | `String`  |

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::catalog::TableIdentifier;
use crate::connection::Connection;
use crate::dialect::{Predicate, SqlDialect};
use crate::error::{Error, Result};
use crate::stats::StatsRecorder;
use crate::types::{ColumnMetadata, Extraction, RawValue, ResultSet, Row, Value};

/// Normalized family of a declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFamily {
    /// Signed integers and unsigned integers narrower than 64 bits
    Integer,
    /// 64-bit unsigned integers
    UnsignedWide,
    /// Floating point and fixed point numbers
    Floating,
    /// Character strings
    Character,
    /// Dates and times
    Temporal(TemporalKind),
    /// Booleans
    Boolean,
    /// Everything else
    Unrecognized,
}

/// Shape of a temporal column, used to render binary-protocol values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalKind {
    /// `YYYY-MM-DD`
    Date,
    /// `[-]HH:MM:SS[.ffffff]`
    Time,
    /// `YYYY-MM-DD HH:MM:SS[.ffffff]`
    DateTime,
}

impl ColumnFamily {
    /// Normalize a declared type name
    ///
    /// Case-insensitive; surrounding whitespace and a trailing `(..)` length
    /// or precision suffix are ignored.
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.trim().to_ascii_uppercase();
        let base = match upper.find('(') {
            Some(idx) => upper[..idx].trim_end(),
            None => upper.as_str(),
        };

        match base {
            "INT" | "INTEGER" | "SMALLINT" | "TINYINT" | "MEDIUMINT" | "BIGINT"
            | "UNSIGNED INT" | "UNSIGNED INTEGER" | "UNSIGNED SMALLINT" | "UNSIGNED TINYINT"
            | "UNSIGNED MEDIUMINT" => Self::Integer,
            "UNSIGNED BIGINT" => Self::UnsignedWide,
            "FLOAT" | "DOUBLE" | "REAL" | "DECIMAL" | "NUMERIC" => Self::Floating,
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => {
                Self::Character
            }
            "DATE" => Self::Temporal(TemporalKind::Date),
            "TIME" => Self::Temporal(TemporalKind::Time),
            "DATETIME" | "TIMESTAMP" => Self::Temporal(TemporalKind::DateTime),
            "BOOL" | "BOOLEAN" => Self::Boolean,
            _ => Self::Unrecognized,
        }
    }

    /// Decode strategy for this family
    pub const fn strategy(self) -> DecodeStrategy {
        match self {
            Self::Integer => DecodeStrategy::SignedInt,
            Self::UnsignedWide => DecodeStrategy::UnsignedInt,
            Self::Floating => DecodeStrategy::Float,
            Self::Character => DecodeStrategy::Text,
            Self::Temporal(kind) => DecodeStrategy::Temporal(kind),
            Self::Boolean => DecodeStrategy::Bool,
            Self::Unrecognized => DecodeStrategy::Raw,
        }
    }
}

/// How a raw value of one column becomes a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeStrategy {
    /// [`Value::Int64`]
    SignedInt,
    /// [`Value::UInt64`], without sign corruption above `i64::MAX`
    UnsignedInt,
    /// [`Value::Float64`]
    Float,
    /// [`Value::String`], must be valid UTF-8
    Text,
    /// [`Value::String`] in the source's textual layout
    Temporal(TemporalKind),
    /// [`Value::Bool`]
    Bool,
    /// [`Value::String`] from whatever bytes arrived (lossy UTF-8)
    Raw,
}

impl DecodeStrategy {
    /// Decode one value; NULL always decodes to [`Value::Null`]
    pub fn decode(self, raw: RawValue) -> Result<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Self::SignedInt => decode_signed(raw),
            Self::UnsignedInt => decode_unsigned(raw),
            Self::Float => decode_float(raw),
            Self::Text => decode_text(raw),
            Self::Temporal(kind) => decode_temporal(raw, kind),
            Self::Bool => decode_bool(raw),
            Self::Raw => Ok(Value::String(match raw {
                RawValue::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                other => other.to_string(),
            })),
        }
    }
}

fn mismatch(raw: &RawValue, target: &str) -> Error {
    Error::type_conversion(format!("cannot decode {raw:?} as {target}"))
}

fn utf8(raw: &RawValue, bytes: &[u8], target: &str) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| mismatch(raw, target))
}

fn decode_signed(raw: RawValue) -> Result<Value> {
    match raw {
        RawValue::Int(n) => Ok(Value::Int64(n)),
        RawValue::UInt(n) => i64::try_from(n)
            .map(Value::Int64)
            .map_err(|_| mismatch(&raw, "signed 64-bit integer")),
        RawValue::Bytes(ref bytes) => utf8(&raw, bytes, "signed 64-bit integer")?
            .trim()
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|_| mismatch(&raw, "signed 64-bit integer")),
        _ => Err(mismatch(&raw, "signed 64-bit integer")),
    }
}

fn decode_unsigned(raw: RawValue) -> Result<Value> {
    match raw {
        RawValue::UInt(n) => Ok(Value::UInt64(n)),
        // BIGINT UNSIGNED above i64::MAX can arrive as a negative signed int
        RawValue::Int(n) => Ok(Value::UInt64(n as u64)),
        RawValue::Bytes(ref bytes) => utf8(&raw, bytes, "unsigned 64-bit integer")?
            .trim()
            .parse::<u64>()
            .map(Value::UInt64)
            .map_err(|_| mismatch(&raw, "unsigned 64-bit integer")),
        _ => Err(mismatch(&raw, "unsigned 64-bit integer")),
    }
}

fn decode_float(raw: RawValue) -> Result<Value> {
    match raw {
        RawValue::Double(n) => Ok(Value::Float64(n)),
        RawValue::Float(n) => Ok(Value::Float64(f64::from(n))),
        RawValue::Int(n) => Ok(Value::Float64(n as f64)),
        RawValue::UInt(n) => Ok(Value::Float64(n as f64)),
        RawValue::Bytes(ref bytes) => utf8(&raw, bytes, "double")?
            .trim()
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|_| mismatch(&raw, "double")),
        _ => Err(mismatch(&raw, "double")),
    }
}

fn decode_text(raw: RawValue) -> Result<Value> {
    match raw {
        RawValue::Bytes(bytes) => String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|e| Error::type_conversion(format!("invalid UTF-8 in text value: {e}"))),
        other @ (RawValue::Int(_) | RawValue::UInt(_) | RawValue::Float(_) | RawValue::Double(_)) => {
            Ok(Value::String(other.to_string()))
        }
        other => Err(mismatch(&other, "string")),
    }
}

fn decode_temporal(raw: RawValue, kind: TemporalKind) -> Result<Value> {
    match (raw, kind) {
        (RawValue::Bytes(bytes), _) => String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|e| Error::type_conversion(format!("invalid UTF-8 in temporal value: {e}"))),
        (RawValue::Date { year, month, day, .. }, TemporalKind::Date) => {
            Ok(Value::String(format!("{year:04}-{month:02}-{day:02}")))
        }
        (date @ RawValue::Date { .. }, _) => Ok(Value::String(date.to_string())),
        (time @ RawValue::Time { .. }, _) => Ok(Value::String(time.to_string())),
        (other, _) => Err(mismatch(&other, "temporal string")),
    }
}

fn decode_bool(raw: RawValue) -> Result<Value> {
    match raw {
        RawValue::Int(n) => Ok(Value::Bool(n != 0)),
        RawValue::UInt(n) => Ok(Value::Bool(n != 0)),
        RawValue::Bytes(ref bytes) => match utf8(&raw, bytes, "boolean")?
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch(&raw, "boolean")),
        },
        _ => Err(mismatch(&raw, "boolean")),
    }
}

/// Per-column decode table for one result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodePlan {
    columns: Vec<String>,
    strategies: Vec<DecodeStrategy>,
}

impl DecodePlan {
    /// Build the plan from the reported column metadata
    pub fn new(columns: &[ColumnMetadata]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            strategies: columns
                .iter()
                .map(|c| ColumnFamily::from_type_name(&c.type_name).strategy())
                .collect(),
        }
    }

    /// Column names in result order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Strategy per column, in result order
    pub fn strategies(&self) -> &[DecodeStrategy] {
        &self.strategies
    }

    /// Decode one raw row
    pub fn decode_row(&self, raw: Vec<RawValue>) -> Result<Row> {
        if raw.len() != self.strategies.len() {
            return Err(Error::internal(format!(
                "row has {} values but the result set declares {} columns",
                raw.len(),
                self.strategies.len()
            )));
        }

        let values = raw
            .into_iter()
            .zip(&self.strategies)
            .zip(&self.columns)
            .map(|((value, strategy), column)| {
                strategy.decode(value).map_err(|e| match e {
                    Error::TypeConversion { message } => {
                        Error::type_conversion(format!("column '{column}': {message}"))
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Row::new(values))
    }

    /// Decode a whole result set; the first failure aborts
    pub fn decode_all(&self, rows: Vec<Vec<RawValue>>) -> Result<Vec<Row>> {
        rows.into_iter().map(|row| self.decode_row(row)).collect()
    }
}

/// Executes bounded extraction queries
pub struct RowExtractor<'a> {
    conn: &'a dyn Connection,
    dialect: &'a dyn SqlDialect,
    stats: Arc<StatsRecorder>,
}

impl<'a> RowExtractor<'a> {
    /// Create an extractor reporting into `stats`
    pub fn new(
        conn: &'a dyn Connection,
        dialect: &'a dyn SqlDialect,
        stats: Arc<StatsRecorder>,
    ) -> Self {
        Self {
            conn,
            dialect,
            stats,
        }
    }

    /// Extract every row of `table` matching `bound` and `filter`
    ///
    /// `bound` is the batch condition built by the caller (for instance from
    /// [`SqlDialect::key_range_condition`]). `worker` only labels log lines.
    pub async fn extract(
        &self,
        worker: usize,
        table: &TableIdentifier,
        bound: &str,
        filter: &Predicate,
    ) -> Result<Extraction> {
        let started = Instant::now();
        let sql = self.dialect.select_sql(table, bound, filter);
        debug!(worker, table = %table, sql = %sql, "extracting rows");

        let ResultSet { columns, rows } = self
            .conn
            .query(&sql)
            .await
            .map_err(|e| e.in_table(&table.database, &table.table, "extract"))?;

        let plan = DecodePlan::new(&columns);
        let rows = plan
            .decode_all(rows)
            .map_err(|e| e.in_table(&table.database, &table.table, "decode"))?;

        let elapsed = started.elapsed();
        let call = self.stats.record(rows.len() as u64, elapsed);
        info!(
            worker,
            table = %table,
            rows = call.rows,
            rows_per_second = call.rows_per_second,
            "extracted rows"
        );

        Ok(Extraction {
            columns: plan.columns,
            rows,
            elapsed,
        })
    }
}
