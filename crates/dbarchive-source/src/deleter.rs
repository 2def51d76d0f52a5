//! Throttled deletion of archived rows
//!
//! Rows are removed in bounded `DELETE ... LIMIT` statements with a fixed
//! pause between consecutive statements, so cleanup never holds long locks or
//! floods the source's replication stream. The number of statements is
//! derived from a row count taken up front; rows inserted after the count
//! are left alone.

use std::time::Duration;
use tracing::{debug, error, info};

use crate::analyzer::TableAnalyzer;
use crate::catalog::{TableIdentifier, TableSet};
use crate::connection::Connection;
use crate::dialect::{Predicate, SqlDialect};
use crate::error::{Error, Result};

/// What happened to one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDeleteOutcome {
    /// The table
    pub table: TableIdentifier,
    /// Rows matching the predicate when the run started
    pub rows_counted: u64,
    /// Number of `DELETE` statements issued
    pub statements: u64,
    /// Rows the source reported as deleted
    pub rows_deleted: u64,
}

/// A table whose deletion stopped early
///
/// `progress` holds what was done before the failure; a table that failed
/// mid-way has already lost `progress.rows_deleted` rows.
#[derive(Debug)]
pub struct TableDeleteFailure {
    /// Work completed before the error
    pub progress: TableDeleteOutcome,
    /// The error that stopped the table
    pub error: Error,
}

impl TableDeleteFailure {
    /// The table
    pub fn table(&self) -> &TableIdentifier {
        &self.progress.table
    }
}

impl TableDeleteOutcome {
    fn started(table: &TableIdentifier) -> Self {
        Self {
            table: table.clone(),
            rows_counted: 0,
            statements: 0,
            rows_deleted: 0,
        }
    }
}

/// Result of a run over many tables
#[derive(Debug, Default)]
pub struct DeleteReport {
    /// Tables that were fully processed
    pub completed: Vec<TableDeleteOutcome>,
    /// Tables that failed, with their partial progress
    pub failed: Vec<TableDeleteFailure>,
}

impl DeleteReport {
    /// Total rows reported deleted, including partially processed tables
    pub fn rows_deleted(&self) -> u64 {
        self.outcomes().map(|o| o.rows_deleted).sum()
    }

    /// Total statements issued, including partially processed tables
    pub fn statements(&self) -> u64 {
        self.outcomes().map(|o| o.statements).sum()
    }

    fn outcomes(&self) -> impl Iterator<Item = &TableDeleteOutcome> {
        self.completed
            .iter()
            .chain(self.failed.iter().map(|f| &f.progress))
    }

    /// Whether every table completed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deletes matching rows in bounded, paced statements
pub struct ThrottledDeleter<'a> {
    conn: &'a dyn Connection,
    dialect: &'a dyn SqlDialect,
    batch_size: u64,
    interval: Duration,
}

impl<'a> ThrottledDeleter<'a> {
    /// Create a deleter; a zero batch size is rejected
    pub fn new(
        conn: &'a dyn Connection,
        dialect: &'a dyn SqlDialect,
        batch_size: u64,
        interval: Duration,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::config("delete batch size must be at least 1"));
        }
        Ok(Self {
            conn,
            dialect,
            batch_size,
            interval,
        })
    }

    /// Rows removed per statement
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Pause between consecutive statements
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Delete every row of `table` matching `predicate`
    ///
    /// Stops at the first failing statement.
    pub async fn delete_table(
        &self,
        table: &TableIdentifier,
        predicate: &Predicate,
    ) -> Result<TableDeleteOutcome> {
        let mut progress = TableDeleteOutcome::started(table);
        self.run_table(&mut progress, predicate).await?;
        Ok(progress)
    }

    /// Delete matching rows from every table; failures are logged and skipped
    pub async fn delete_all(&self, tables: &TableSet, predicate: &Predicate) -> DeleteReport {
        let mut report = DeleteReport::default();
        for table in tables.iter() {
            let mut progress = TableDeleteOutcome::started(&table);
            match self.run_table(&mut progress, predicate).await {
                Ok(()) => report.completed.push(progress),
                Err(e) => {
                    error!(
                        table = %table,
                        rows_counted = progress.rows_counted,
                        statements = progress.statements,
                        rows_deleted = progress.rows_deleted,
                        error = %e,
                        "failed to delete archived rows"
                    );
                    report.failed.push(TableDeleteFailure {
                        progress,
                        error: e,
                    });
                }
            }
        }
        report
    }

    async fn run_table(&self, progress: &mut TableDeleteOutcome, predicate: &Predicate) -> Result<()> {
        let table = progress.table.clone();
        let analyzer = TableAnalyzer::new(self.conn, self.dialect);
        progress.rows_counted = analyzer
            .row_count(&table, predicate)
            .await
            .map_err(|e| e.in_table(&table.database, &table.table, "delete count"))?;

        let mut remaining = progress.rows_counted;
        while remaining > 0 {
            let limit = remaining.min(self.batch_size);
            let sql = self.dialect.delete_limit_sql(&table, predicate, limit);
            debug!(table = %table, sql = %sql, remaining, "deleting batch");

            let affected = self
                .conn
                .execute(&sql)
                .await
                .map_err(|e| e.in_table(&table.database, &table.table, "delete"))?;
            progress.statements += 1;
            progress.rows_deleted = progress.rows_deleted.saturating_add(affected);
            remaining -= limit;

            if remaining > 0 && !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }

        info!(
            table = %table,
            rows = progress.rows_deleted,
            statements = progress.statements,
            "deleted archived rows"
        );
        Ok(())
    }
}
