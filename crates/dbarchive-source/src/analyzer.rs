//! Range and cardinality analysis for one table
//!
//! Read-only aggregates used for batch sizing and range splitting. Every
//! figure is a snapshot: the source may change right after the query.

use tracing::debug;

use crate::catalog::{TableIdentifier, TableSet};
use crate::connection::Connection;
use crate::dialect::{Predicate, SqlDialect};
use crate::error::{Error, Result};
use crate::types::RawValue;

/// Minimum and maximum of a numeric split-key column
///
/// When the aggregate comes back NULL (no matching rows, or the column is
/// NULL everywhere) the range is reported as `[0, 0]`. That is
/// indistinguishable from a column whose only value is `0`; callers that
/// care must check the row count as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SplitKeyRange {
    /// Smallest key value
    pub min: u64,
    /// Largest key value
    pub max: u64,
}

impl SplitKeyRange {
    /// The range reported for "no data"
    pub const ZERO: Self = Self { min: 0, max: 0 };

    /// Create a range
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Whether this is the `[0, 0]` range (see the type docs)
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.min == 0 && self.max == 0
    }

    /// Number of key values covered, `max - min + 1`
    ///
    /// Saturates: a reversed range has width 1 and the full `u64` domain has
    /// width `u64::MAX`.
    #[inline]
    pub const fn width(&self) -> u64 {
        self.max.saturating_sub(self.min).saturating_add(1)
    }
}

/// Minimum and maximum of a temporal split-key column, as the source prints them
///
/// Empty strings stand for "no data", mirroring [`SplitKeyRange::ZERO`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeSplitKeyRange {
    /// Earliest value
    pub min: String,
    /// Latest value
    pub max: String,
}

impl TimeSplitKeyRange {
    /// Whether no bounds were found
    pub fn is_empty(&self) -> bool {
        self.min.is_empty() && self.max.is_empty()
    }
}

/// Runs aggregate queries against a single connection
pub struct TableAnalyzer<'a> {
    conn: &'a dyn Connection,
    dialect: &'a dyn SqlDialect,
}

impl<'a> TableAnalyzer<'a> {
    /// Create an analyzer
    pub fn new(conn: &'a dyn Connection, dialect: &'a dyn SqlDialect) -> Self {
        Self { conn, dialect }
    }

    /// Number of rows matching `predicate`; an empty result counts as 0
    pub async fn row_count(&self, table: &TableIdentifier, predicate: &Predicate) -> Result<u64> {
        let sql = self.dialect.count_sql(table, predicate);
        debug!(table = %table, sql = %sql, "counting rows");

        let count = match self.conn.query_one(&sql).await? {
            Some(row) => match row.into_iter().next() {
                Some(RawValue::Null) | None => 0,
                Some(value) => to_u64(&value)?,
            },
            None => 0,
        };
        Ok(count)
    }

    /// Sum of row counts over every table in `tables`
    pub async fn total_row_count(&self, tables: &TableSet, predicate: &Predicate) -> Result<u64> {
        let mut total: u64 = 0;
        for table in tables.iter() {
            let count = self
                .row_count(&table, predicate)
                .await
                .map_err(|e| e.in_table(&table.database, &table.table, "row count"))?;
            total = total.saturating_add(count);
        }
        Ok(total)
    }

    /// `MIN`/`MAX` of a numeric key column
    pub async fn split_key_range(
        &self,
        table: &TableIdentifier,
        predicate: &Predicate,
        key_column: &str,
    ) -> Result<SplitKeyRange> {
        let Some((min, max)) = self.min_max(table, predicate, key_column).await? else {
            return Ok(SplitKeyRange::ZERO);
        };
        let min = to_u64(&min).map_err(|e| annotate(e, "min", key_column))?;
        let max = to_u64(&max).map_err(|e| annotate(e, "max", key_column))?;
        Ok(SplitKeyRange::new(min, max))
    }

    /// `MIN`/`MAX` of a temporal key column, in the source's text form
    pub async fn time_split_key_range(
        &self,
        table: &TableIdentifier,
        predicate: &Predicate,
        key_column: &str,
    ) -> Result<TimeSplitKeyRange> {
        let Some((min, max)) = self.min_max(table, predicate, key_column).await? else {
            return Ok(TimeSplitKeyRange::default());
        };
        Ok(TimeSplitKeyRange {
            min: to_text(min)?,
            max: to_text(max)?,
        })
    }

    async fn min_max(
        &self,
        table: &TableIdentifier,
        predicate: &Predicate,
        key_column: &str,
    ) -> Result<Option<(RawValue, RawValue)>> {
        let sql = self.dialect.min_max_sql(table, key_column, predicate);
        debug!(table = %table, sql = %sql, "reading split key range");

        let Some(row) = self.conn.query_one(&sql).await? else {
            return Ok(None);
        };
        let mut values = row.into_iter();
        match (values.next(), values.next()) {
            (Some(min), Some(max)) if !min.is_null() && !max.is_null() => Ok(Some((min, max))),
            (Some(_), Some(_)) => Ok(None),
            _ => Err(Error::query_with_sql(
                "expected two columns from MIN/MAX query",
                sql,
            )),
        }
    }
}

fn annotate(err: Error, bound: &str, column: &str) -> Error {
    match err {
        Error::TypeConversion { message } => {
            Error::type_conversion(format!("failed to convert {bound} of '{column}': {message}"))
        }
        other => other,
    }
}

/// Interpret an aggregate value as `u64`
///
/// Accepts unsigned and signed integers, and decimal digits sent as bytes or
/// text. A negative signed integer is reinterpreted bit for bit, because
/// some drivers hand back `BIGINT UNSIGNED` values above `i64::MAX` that way.
pub fn to_u64(value: &RawValue) -> Result<u64> {
    match value {
        RawValue::UInt(n) => Ok(*n),
        RawValue::Int(n) => Ok(*n as u64),
        RawValue::Bytes(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|_| {
                Error::type_conversion(format!("cannot convert non UTF-8 bytes {bytes:?} to u64"))
            })?;
            parse_u64(text)
        }
        other => Err(Error::type_conversion(format!(
            "cannot convert {other:?} to u64"
        ))),
    }
}

fn parse_u64(text: &str) -> Result<u64> {
    text.trim()
        .parse::<u64>()
        .map_err(|e| Error::type_conversion(format!("cannot convert '{text}' to u64: {e}")))
}

fn to_text(value: RawValue) -> Result<String> {
    match value {
        RawValue::Bytes(bytes) => String::from_utf8(bytes)
            .map_err(|e| Error::type_conversion(format!("non UTF-8 temporal value: {e}"))),
        other => Ok(other.to_string()),
    }
}
