//! Extraction throughput statistics
//!
//! One [`StatsRecorder`] is shared (behind an `Arc`) by every extraction
//! worker. Updates and snapshots go through a single mutex so concurrent
//! records are never lost and a snapshot is consistent at the time it is
//! taken.

use parking_lot::Mutex;
use std::time::Duration;

/// Throughput of a single extraction call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionStats {
    /// Rows returned by the call
    pub rows: u64,
    /// Wall time of the call
    pub elapsed: Duration,
    /// `rows / elapsed`, 0 when no time elapsed
    pub rows_per_second: f64,
}

/// Aggregated throughput across every recorded call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SourceStats {
    /// Total rows extracted
    pub rows: u64,
    /// Number of extraction calls
    pub calls: u64,
    /// Sum of wall time spent in extraction calls
    pub busy_time: Duration,
    /// `rows / busy_time`, 0 when nothing was recorded
    pub rows_per_second: f64,
}

#[derive(Debug, Default)]
struct Totals {
    rows: u64,
    calls: u64,
    busy_time: Duration,
}

/// Shared aggregator for extraction throughput
#[derive(Debug, Default)]
pub struct StatsRecorder {
    totals: Mutex<Totals>,
}

impl StatsRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one extraction call and return its own throughput
    pub fn record(&self, rows: u64, elapsed: Duration) -> ExtractionStats {
        {
            let mut totals = self.totals.lock();
            totals.rows = totals.rows.saturating_add(rows);
            totals.calls += 1;
            totals.busy_time = totals.busy_time.saturating_add(elapsed);
        }

        ExtractionStats {
            rows,
            elapsed,
            rows_per_second: rate(rows, elapsed),
        }
    }

    /// Consistent snapshot of the totals
    pub fn snapshot(&self) -> SourceStats {
        let totals = self.totals.lock();
        SourceStats {
            rows: totals.rows,
            calls: totals.calls,
            busy_time: totals.busy_time,
            rows_per_second: rate(totals.rows, totals.busy_time),
        }
    }

    /// Clear the totals
    pub fn reset(&self) {
        *self.totals.lock() = Totals::default();
    }
}

fn rate(rows: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        rows as f64 / secs
    } else {
        0.0
    }
}
