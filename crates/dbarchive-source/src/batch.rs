//! Adaptive batch sizing
//!
//! A single fixed batch size is too small for sparse key ranges (many empty
//! windows) and too large for dense ones. The sizer compares the key-range
//! width with the row count once per table and widens the batch when keys
//! are spread thin:
//!
//! | condition                 | batch              |
//! |---------------------------|--------------------|
//! | `rows <= base`            | whole key range    |
//! | `width / rows >= 100`     | `base * 20`        |
//! | `width / rows >= 10`      | `base * 5`         |
//! | otherwise                 | `base`             |
//!
//! Sizing is advisory: when the range or count cannot be read the base size
//! is used and the failure is only logged.

use tracing::{debug, warn};

use crate::analyzer::{SplitKeyRange, TableAnalyzer};
use crate::catalog::TableIdentifier;
use crate::dialect::Predicate;

/// Multiplier applied for moderately sparse key ranges
pub const WIDE_MULTIPLIER: u64 = 5;
/// Multiplier applied for very sparse key ranges
pub const WIDEST_MULTIPLIER: u64 = 20;
/// `width / rows` ratio at which [`BatchTier::Wide`] applies
pub const WIDE_RATIO: u64 = 10;
/// `width / rows` ratio at which [`BatchTier::Widest`] applies
pub const WIDEST_RATIO: u64 = 100;

/// Which rule produced a batch size
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BatchTier {
    /// Sizing inputs were unavailable; base size used
    Fallback,
    /// Dense keys; base size used
    Base,
    /// Sparse keys; base size times [`WIDE_MULTIPLIER`]
    Wide,
    /// Very sparse keys; base size times [`WIDEST_MULTIPLIER`]
    Widest,
    /// Whole table fits in one batch; the key-range width is used
    WholeRange,
}

/// Batch size chosen for one table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSizeDecision {
    /// Rows (or key-range width) per batch
    pub size: u64,
    /// Rule that produced `size`
    pub tier: BatchTier,
}

impl BatchSizeDecision {
    /// Decision used when sizing inputs are unavailable
    pub const fn fallback(base: u64) -> Self {
        Self {
            size: base,
            tier: BatchTier::Fallback,
        }
    }
}

/// Choose a batch size from the key range, row count and base size
///
/// Ratios use truncating integer division, so a ratio that truncates to
/// exactly 10 or 100 selects the larger multiplier.
pub fn adjust_batch_size(range: SplitKeyRange, rows: u64, base: u64) -> BatchSizeDecision {
    let width = range.width();

    if rows <= base {
        return BatchSizeDecision {
            size: width,
            tier: BatchTier::WholeRange,
        };
    }

    // rows > base >= 0, so rows is never zero here
    let ratio = width / rows;
    if ratio >= WIDEST_RATIO {
        BatchSizeDecision {
            size: base.saturating_mul(WIDEST_MULTIPLIER),
            tier: BatchTier::Widest,
        }
    } else if ratio >= WIDE_RATIO {
        BatchSizeDecision {
            size: base.saturating_mul(WIDE_MULTIPLIER),
            tier: BatchTier::Wide,
        }
    } else {
        BatchSizeDecision {
            size: base,
            tier: BatchTier::Base,
        }
    }
}

/// Sizer that reads its inputs from the source
pub struct AdaptiveBatchSizer<'a> {
    analyzer: &'a TableAnalyzer<'a>,
    base: u64,
}

impl<'a> AdaptiveBatchSizer<'a> {
    /// Create a sizer with the configured base batch size
    pub fn new(analyzer: &'a TableAnalyzer<'a>, base: u64) -> Self {
        Self { analyzer, base }
    }

    /// Configured base batch size
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Decide the batch size for `table`; never fails
    pub async fn decide(
        &self,
        table: &TableIdentifier,
        predicate: &Predicate,
        key_column: &str,
    ) -> BatchSizeDecision {
        let range = match self
            .analyzer
            .split_key_range(table, predicate, key_column)
            .await
        {
            Ok(range) => range,
            Err(e) => {
                warn!(table = %table, error = %e, "split key range unavailable, using base batch size");
                return BatchSizeDecision::fallback(self.base);
            }
        };

        let rows = match self.analyzer.row_count(table, predicate).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table = %table, error = %e, "row count unavailable, using base batch size");
                return BatchSizeDecision::fallback(self.base);
            }
        };

        let decision = adjust_batch_size(range, rows, self.base);
        debug!(
            table = %table,
            min = range.min,
            max = range.max,
            rows,
            size = decision.size,
            tier = ?decision.tier,
            "chose batch size"
        );
        decision
    }
}

/// Inclusive window of split-key values covered by one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyWindow {
    /// First key in the window
    pub start: u64,
    /// Last key in the window
    pub end: u64,
}

/// Splits a key range into consecutive windows of a fixed width
///
/// The last window is clamped to the range maximum. A width of zero is
/// treated as one.
#[derive(Debug, Clone)]
pub struct KeyRangeBatches {
    next: Option<u64>,
    max: u64,
    width: u64,
}

impl KeyRangeBatches {
    /// Windows covering `range` with `width` keys each
    pub fn new(range: SplitKeyRange, width: u64) -> Self {
        Self {
            next: (range.min <= range.max).then_some(range.min),
            max: range.max,
            width: width.max(1),
        }
    }
}

impl Iterator for KeyRangeBatches {
    type Item = KeyWindow;

    fn next(&mut self) -> Option<KeyWindow> {
        let start = self.next?;
        let end = start.saturating_add(self.width - 1).min(self.max);
        self.next = if end >= self.max { None } else { Some(end + 1) };
        Some(KeyWindow { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_table_takes_whole_range() {
        let decision = adjust_batch_size(SplitKeyRange::new(1, 5000), 50, 100);
        assert_eq!(decision.tier, BatchTier::WholeRange);
        assert_eq!(decision.size, 5000);
    }

    #[test]
    fn test_very_sparse_keys() {
        // width 1050, rows 10 -> ratio 105
        let decision = adjust_batch_size(SplitKeyRange::new(1, 1050), 10, 5);
        assert_eq!(decision.tier, BatchTier::Widest);
        assert_eq!(decision.size, 100);
    }

    #[test]
    fn test_ratio_ties_take_larger_tier() {
        // width 1000 / rows 100 == 10 exactly
        let wide = adjust_batch_size(SplitKeyRange::new(1, 1000), 100, 10);
        assert_eq!(wide.tier, BatchTier::Wide);
        assert_eq!(wide.size, 50);

        // width 10_000 / rows 100 == 100 exactly
        let widest = adjust_batch_size(SplitKeyRange::new(1, 10_000), 100, 10);
        assert_eq!(widest.tier, BatchTier::Widest);
        assert_eq!(widest.size, 200);

        // width 999 / rows 100 truncates to 9
        let base = adjust_batch_size(SplitKeyRange::new(1, 999), 100, 10);
        assert_eq!(base.tier, BatchTier::Base);
        assert_eq!(base.size, 10);
    }

    #[test]
    fn test_empty_range_and_no_rows() {
        let decision = adjust_batch_size(SplitKeyRange::ZERO, 0, 100);
        assert_eq!(decision.tier, BatchTier::WholeRange);
        assert_eq!(decision.size, 1);
    }

    #[test]
    fn test_full_domain_range() {
        let decision = adjust_batch_size(SplitKeyRange::new(0, u64::MAX), u64::MAX / 2, u64::MAX / 4);
        assert_eq!(decision.tier, BatchTier::Base);

        let decision = adjust_batch_size(SplitKeyRange::new(0, u64::MAX), 1_000, 999);
        assert_eq!(decision.tier, BatchTier::Widest);
        assert_eq!(decision.size, 999 * 20);
    }

    #[test]
    fn test_key_windows_cover_range() {
        let windows: Vec<_> = KeyRangeBatches::new(SplitKeyRange::new(1, 10), 4).collect();
        assert_eq!(
            windows,
            vec![
                KeyWindow { start: 1, end: 4 },
                KeyWindow { start: 5, end: 8 },
                KeyWindow { start: 9, end: 10 },
            ]
        );
    }

    #[test]
    fn test_key_windows_edges() {
        assert_eq!(KeyRangeBatches::new(SplitKeyRange::new(5, 4), 10).count(), 0);
        assert_eq!(KeyRangeBatches::new(SplitKeyRange::ZERO, 0).count(), 1);

        let top: Vec<_> =
            KeyRangeBatches::new(SplitKeyRange::new(u64::MAX - 2, u64::MAX), 2).collect();
        assert_eq!(
            top,
            vec![
                KeyWindow { start: u64::MAX - 2, end: u64::MAX - 1 },
                KeyWindow { start: u64::MAX, end: u64::MAX },
            ]
        );
    }
}
