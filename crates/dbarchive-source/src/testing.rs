//! Testing utilities
//!
//! [`MockConnection`] is an in-memory, scripted [`Connection`]: register the
//! result set a statement should return (by exact text or by prefix), inject
//! failures, and inspect every statement that was sent.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbarchive_source::testing::MockConnection;
//! use dbarchive_source::types::RawValue;
//!
//! let conn = MockConnection::new()
//!     .with_names("SHOW DATABASES", ["sales_eu", "sales_us"])
//!     .with_prefix_rows("SELECT COUNT(*)", vec![vec![RawValue::text("42")]])
//!     .fail_on_prefix("DELETE FROM `sales_us`", "lock wait timeout");
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::types::{ColumnMetadata, RawValue, ResultSet};

type AffectedRowsFn = Arc<dyn Fn(&str) -> u64 + Send + Sync>;

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Prefix(String),
}

impl Matcher {
    fn matches(&self, sql: &str) -> bool {
        match self {
            Self::Exact(text) => sql == text,
            Self::Prefix(prefix) => sql.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Rows(ResultSet),
    Fail(String),
}

/// A scripted in-memory connection
///
/// Exact-text responses win over prefix responses; among prefix responses the
/// one registered first wins. A query with no scripted response fails with a
/// query error. Statements sent through `execute` consult failure rules
/// only, and report affected rows through [`MockConnection::with_affected_rows`]
/// (0 by default).
#[derive(Clone)]
pub struct MockConnection {
    rules: Arc<Mutex<Vec<(Matcher, Reply)>>>,
    executed: Arc<Mutex<Vec<String>>>,
    affected_rows: Arc<Mutex<Option<AffectedRowsFn>>>,
    closed: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("rules", &self.rules.lock().len())
            .field("executed", &self.executed.lock().len())
            .finish()
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnection {
    /// Create a connection with no scripted responses
    pub fn new() -> Self {
        Self {
            rules: Arc::new(Mutex::new(Vec::new())),
            executed: Arc::new(Mutex::new(Vec::new())),
            affected_rows: Arc::new(Mutex::new(None)),
            closed: Arc::new(Mutex::new(false)),
        }
    }

    /// Respond to exactly `sql` with `result`
    pub fn with_result(self, sql: impl Into<String>, result: ResultSet) -> Self {
        self.push(Matcher::Exact(sql.into()), Reply::Rows(result))
    }

    /// Respond to any statement starting with `prefix` with `result`
    pub fn with_prefix_result(self, prefix: impl Into<String>, result: ResultSet) -> Self {
        self.push(Matcher::Prefix(prefix.into()), Reply::Rows(result))
    }

    /// Respond to any statement starting with `prefix` with untyped rows
    ///
    /// Columns are named `c0`, `c1`, ... with type `UNKNOWN`.
    pub fn with_prefix_rows(self, prefix: impl Into<String>, rows: Vec<Vec<RawValue>>) -> Self {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let columns = (0..width)
            .map(|i| ColumnMetadata::new(format!("c{i}"), "UNKNOWN").with_ordinal(i))
            .collect();
        self.with_prefix_result(prefix, ResultSet::new(columns, rows))
    }

    /// Respond to exactly `sql` with a one-column list of names
    pub fn with_names<I, S>(self, sql: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = names.into_iter().map(RawValue::text);
        self.with_result(sql, ResultSet::single_column("name", "VARCHAR", values))
    }

    /// Fail exactly `sql` with a query error
    pub fn fail_on(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        self.push(Matcher::Exact(sql.into()), Reply::Fail(message.into()))
    }

    /// Fail every statement starting with `prefix` with a query error
    pub fn fail_on_prefix(self, prefix: impl Into<String>, message: impl Into<String>) -> Self {
        self.push(Matcher::Prefix(prefix.into()), Reply::Fail(message.into()))
    }

    /// Compute the affected-row count reported by `execute`
    pub fn with_affected_rows<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> u64 + Send + Sync + 'static,
    {
        *self.affected_rows.lock() = Some(Arc::new(f));
        self
    }

    /// Every statement sent so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// Number of statements sent that start with `prefix`
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.executed
            .lock()
            .iter()
            .filter(|sql| sql.starts_with(prefix))
            .count()
    }

    /// Forget the statement log
    pub fn clear_executed(&self) {
        self.executed.lock().clear();
    }

    fn push(self, matcher: Matcher, reply: Reply) -> Self {
        self.rules.lock().push((matcher, reply));
        self
    }

    fn lookup(&self, sql: &str) -> Option<Reply> {
        let rules = self.rules.lock();
        rules
            .iter()
            .find(|(m, _)| matches!(m, Matcher::Exact(_)) && m.matches(sql))
            .or_else(|| {
                rules
                    .iter()
                    .find(|(m, _)| matches!(m, Matcher::Prefix(_)) && m.matches(sql))
            })
            .map(|(_, reply)| reply.clone())
    }

    fn record(&self, sql: &str) -> Result<()> {
        if *self.closed.lock() {
            return Err(Error::connection("connection is closed"));
        }
        self.executed.lock().push(sql.to_string());
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, sql: &str) -> Result<ResultSet> {
        self.record(sql)?;
        match self.lookup(sql) {
            Some(Reply::Rows(result)) => Ok(result),
            Some(Reply::Fail(message)) => Err(Error::query_with_sql(message, sql)),
            None => Err(Error::query_with_sql("no scripted response", sql)),
        }
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        self.record(sql)?;
        if let Some(Reply::Fail(message)) = self.lookup(sql) {
            return Err(Error::query_with_sql(message, sql));
        }
        let affected = self.affected_rows.lock().clone();
        Ok(affected.map(|f| f(sql)).unwrap_or(0))
    }

    async fn is_valid(&self) -> bool {
        !*self.closed.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}
