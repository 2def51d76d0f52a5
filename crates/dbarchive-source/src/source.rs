//! Archive source facade
//!
//! [`ArchiveSource`] ties one validated [`SourceConfig`] to one connection
//! and exposes the engine in the order a job uses it: discover tables, size
//! batches, extract windows, clean up.
//!
//! ```rust,ignore
//! let source = ArchiveSource::connect(config).await?;
//! let tables = source.resolve_tables().await?;
//! for table in tables.iter() {
//!     let range = source.split_key_range(&table).await?;
//!     let decision = source.adjust_batch_size(&table).await?;
//!     for window in KeyRangeBatches::new(range, decision.size) {
//!         let batch = source.extract_window(0, &table, window).await?;
//!         sink.write(batch).await?;
//!     }
//! }
//! source.delete_after_sync(&tables).await;
//! ```

use std::sync::Arc;
use tracing::info;

use crate::analyzer::{SplitKeyRange, TableAnalyzer, TimeSplitKeyRange};
use crate::batch::{AdaptiveBatchSizer, BatchSizeDecision, KeyWindow};
use crate::catalog::{CatalogResolver, TableIdentifier, TableSelector, TableSet};
use crate::config::SourceConfig;
use crate::connection::Connection;
use crate::deleter::{DeleteReport, ThrottledDeleter};
use crate::dialect::{MySqlDialect, Predicate, SqlDialect};
use crate::error::{Error, Result};
use crate::extractor::RowExtractor;
use crate::stats::{SourceStats, StatsRecorder};
use crate::types::Extraction;

/// Extraction engine bound to one source connection
pub struct ArchiveSource {
    config: SourceConfig,
    selectors: Vec<TableSelector>,
    predicate: Predicate,
    conn: Box<dyn Connection>,
    dialect: MySqlDialect,
    stats: Arc<StatsRecorder>,
}

impl ArchiveSource {
    /// Connect to the configured MySQL server
    #[cfg(feature = "mysql")]
    pub async fn connect(config: SourceConfig) -> Result<Self> {
        config.validate_all()?;
        let conn_config = config.connection_config()?;
        let conn = crate::mysql::MySqlConnection::connect(&conn_config).await?;
        Self::new(config, Box::new(conn))
    }

    /// Build over an existing connection; the configuration is validated
    pub fn new(config: SourceConfig, conn: Box<dyn Connection>) -> Result<Self> {
        config.validate_all()?;
        let selectors = config.selectors()?;
        let predicate = config.predicate()?;
        Ok(Self {
            config,
            selectors,
            predicate,
            conn,
            dialect: MySqlDialect,
            stats: Arc::new(StatsRecorder::new()),
        })
    }

    /// Report throughput into a recorder shared with other sources
    pub fn with_stats(mut self, stats: Arc<StatsRecorder>) -> Self {
        self.stats = stats;
        self
    }

    /// The configuration this source was built from
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// The row filter applied to every statement
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// The underlying connection
    pub fn connection(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    /// Resolve the configured selectors and explicit table
    pub async fn resolve_tables(&self) -> Result<TableSet> {
        let explicit = self.config.explicit_table();
        CatalogResolver::new(self.conn.as_ref(), &self.dialect)
            .resolve(&self.selectors, explicit.as_ref())
            .await
    }

    /// Rows of `table` matching the filter
    pub async fn row_count(&self, table: &TableIdentifier) -> Result<u64> {
        self.analyzer()
            .row_count(table, &self.predicate)
            .await
            .map_err(|e| e.in_table(&table.database, &table.table, "row count"))
    }

    /// Rows matching the filter across every table in `tables`
    pub async fn total_row_count(&self, tables: &TableSet) -> Result<u64> {
        self.analyzer().total_row_count(tables, &self.predicate).await
    }

    /// Range of the configured numeric split key
    pub async fn split_key_range(&self, table: &TableIdentifier) -> Result<SplitKeyRange> {
        let key = self.split_key()?;
        self.analyzer()
            .split_key_range(table, &self.predicate, key)
            .await
            .map_err(|e| e.in_table(&table.database, &table.table, "split key range"))
    }

    /// Range of the configured temporal split key
    pub async fn time_split_key_range(&self, table: &TableIdentifier) -> Result<TimeSplitKeyRange> {
        let key = self.config.split_time_key.as_deref().ok_or_else(|| {
            Error::config("split_time_key is not configured")
        })?;
        self.analyzer()
            .time_split_key_range(table, &self.predicate, key)
            .await
            .map_err(|e| e.in_table(&table.database, &table.table, "time split key range"))
    }

    /// Batch size for `table`; degrades to the base size instead of failing
    pub async fn adjust_batch_size(&self, table: &TableIdentifier) -> Result<BatchSizeDecision> {
        let key = self.split_key()?;
        let analyzer = self.analyzer();
        Ok(AdaptiveBatchSizer::new(&analyzer, self.config.batch_size)
            .decide(table, &self.predicate, key)
            .await)
    }

    /// Extract the rows of `table` inside `bound`, also honoring the filter
    pub async fn extract(
        &self,
        worker: usize,
        table: &TableIdentifier,
        bound: &str,
    ) -> Result<Extraction> {
        RowExtractor::new(self.conn.as_ref(), &self.dialect, Arc::clone(&self.stats))
            .extract(worker, table, bound, &self.predicate)
            .await
    }

    /// Extract the rows of `table` whose split key falls in `window`
    pub async fn extract_window(
        &self,
        worker: usize,
        table: &TableIdentifier,
        window: KeyWindow,
    ) -> Result<Extraction> {
        let bound = self
            .dialect
            .key_range_condition(self.split_key()?, window.start, window.end);
        self.extract(worker, table, &bound).await
    }

    /// Delete archived rows when `delete_after_sync` is enabled
    ///
    /// Returns an empty report when the flag is off. Per-table failures are
    /// logged and reported, never returned as an error.
    pub async fn delete_after_sync(&self, tables: &TableSet) -> Result<DeleteReport> {
        if !self.config.delete_after_sync {
            return Ok(DeleteReport::default());
        }

        let deleter = ThrottledDeleter::new(
            self.conn.as_ref(),
            &self.dialect,
            self.config.batch_size,
            self.config.delete_interval(),
        )?;
        let report = deleter.delete_all(tables, &self.predicate).await;
        info!(
            tables = report.completed.len(),
            failed = report.failed.len(),
            rows = report.rows_deleted(),
            statements = report.statements(),
            "delete after sync finished"
        );
        Ok(report)
    }

    /// Throughput across every extraction so far
    pub fn stats(&self) -> SourceStats {
        self.stats.snapshot()
    }

    /// Close the connection
    pub async fn close(&self) -> Result<()> {
        self.conn.close().await
    }

    fn analyzer(&self) -> TableAnalyzer<'_> {
        TableAnalyzer::new(self.conn.as_ref(), &self.dialect)
    }

    fn split_key(&self) -> Result<&str> {
        self.config
            .split_key
            .as_deref()
            .ok_or_else(|| Error::config("split_key is not configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnection;

    fn config() -> SourceConfig {
        let mut config = SourceConfig::new("localhost", "root");
        config.db_tables = vec!["^sales@orders$".into()];
        config
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut bad = config();
        bad.where_condition = "id > 1; DROP TABLE x".into();
        let conn = MockConnection::new();
        assert!(ArchiveSource::new(bad, Box::new(conn.clone())).is_err());
        assert!(conn.executed().is_empty());
    }

    #[tokio::test]
    async fn test_split_key_required() {
        let source = ArchiveSource::new(config(), Box::new(MockConnection::new())).unwrap();
        let table = TableIdentifier::new("sales", "orders");

        let err = source.split_key_range(&table).await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(source.adjust_batch_size(&table).await.is_err());
        assert!(source.time_split_key_range(&table).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_disabled_is_noop() {
        let conn = MockConnection::new();
        let source = ArchiveSource::new(config(), Box::new(conn.clone())).unwrap();
        let tables: TableSet = [TableIdentifier::new("sales", "orders")].into_iter().collect();

        let report = source.delete_after_sync(&tables).await.unwrap();
        assert!(report.completed.is_empty());
        assert!(conn.executed().is_empty());
    }
}
