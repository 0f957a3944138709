//! Run progress and summary models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::item::RowId;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Work items handed to the run.
    pub rows_total: u64,
    /// Items whose row id was already recorded.
    pub rows_skipped_already_done: u64,
    /// Items recorded in this run, failed or not.
    pub rows_processed: u64,
    pub rows_succeeded: u64,
    pub rows_failed: u64,
    pub batches: u64,
    pub checkpoints_written: u64,
    pub duration_ms: u64,
}

impl RunSummary {
    /// Percentage of processed rows that succeeded.
    pub fn success_rate(&self) -> f64 {
        success_rate(self.rows_succeeded, self.rows_processed)
    }
}

/// Stats for one completed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// 1-based batch number within the run.
    pub batch: u64,
    pub total_batches: u64,
    pub first_row: RowId,
    pub last_row: RowId,
    pub rows: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl BatchReport {
    pub fn success_rate(&self) -> f64 {
        success_rate(self.succeeded, self.rows)
    }
}

/// A checkpoint file that was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    /// Monotonic checkpoint number; the highest is the latest.
    pub sequence: u64,
    pub records: u64,
    pub written_at: DateTime<Utc>,
}

fn success_rate(succeeded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    succeeded as f64 * 100.0 / total as f64
}
