//! # dbarchive-source
//!
//! Source-side extraction engine for database-to-database archiving.
//!
//! The crate works out which tables to copy, how large each extraction batch
//! should be, pulls rows out of a MySQL source without losing type fidelity
//! (NULLs stay NULL, unsigned 64-bit values stay exact) and can delete
//! archived rows afterwards in paced batches.
//!
//! ## Features
//!
//! - **Catalog Resolution**: `<database-regex>@<table-regex>` selectors expanded against `SHOW DATABASES` / `SHOW TABLES`
//! - **Range & Cardinality Analysis**: `COUNT(*)` and split-key `MIN`/`MAX` under a row filter
//! - **Adaptive Batch Sizing**: wider batches for sparse key ranges
//! - **Row Extraction**: per-column decode plan built once per query
//! - **Throttled Deletion**: bounded `DELETE ... LIMIT` with a pause between statements
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dbarchive_source::prelude::*;
//!
//! let source = ArchiveSource::connect(config).await?;
//! let tables = source.resolve_tables().await?;
//!
//! for table in tables.iter() {
//!     let range = source.split_key_range(&table).await?;
//!     let decision = source.adjust_batch_size(&table).await?;
//!     for window in KeyRangeBatches::new(range, decision.size) {
//!         let batch = source.extract_window(0, &table, window).await?;
//!         println!("{table}: {} rows", batch.len());
//!     }
//! }
//!
//! source.delete_after_sync(&tables).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `mysql` (default) - MySQL/MariaDB connections via mysql_async
//! - `full` - All features enabled

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod analyzer;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod deleter;
pub mod dialect;
pub mod error;
pub mod extractor;
pub mod source;
pub mod stats;
pub mod testing;
pub mod types;

// Backend implementations (conditionally compiled)
#[cfg(feature = "mysql")]
pub mod mysql;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and type system
    pub use crate::types::{ColumnMetadata, Extraction, RawValue, ResultSet, Row, Value};

    // Connection traits and config
    pub use crate::connection::{Connection, ConnectionConfig, ConnectionFactory};
    pub use crate::config::{SensitiveString, SourceConfig};

    // SQL generation
    pub use crate::dialect::{MySqlDialect, Predicate, SqlDialect};

    // Engine
    pub use crate::analyzer::{SplitKeyRange, TableAnalyzer, TimeSplitKeyRange};
    pub use crate::batch::{
        adjust_batch_size, AdaptiveBatchSizer, BatchSizeDecision, BatchTier, KeyRangeBatches,
        KeyWindow,
    };
    pub use crate::catalog::{CatalogResolver, TableIdentifier, TableSelector, TableSet};
    pub use crate::deleter::{
        DeleteReport, TableDeleteFailure, TableDeleteOutcome, ThrottledDeleter,
    };
    pub use crate::extractor::{ColumnFamily, DecodePlan, DecodeStrategy, RowExtractor};
    pub use crate::source::ArchiveSource;
    pub use crate::stats::{ExtractionStats, SourceStats, StatsRecorder};

    #[cfg(feature = "mysql")]
    pub use crate::mysql::{MySqlConnection, MySqlConnectionFactory};
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use types::Value;
