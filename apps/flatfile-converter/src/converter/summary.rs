//! Run summary.

use chrono::NaiveDate;
use serde::Serialize;

use super::ProcessingMode;

/// Counts reported at the end of a conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
    /// Trading date converted.
    pub date: NaiveDate,
    /// Processing mode used.
    pub mode: ProcessingMode,
    /// Channel files discovered.
    pub files: usize,
    /// Channels that could not be opened or failed while reading.
    pub failed_channels: Vec<String>,
    /// Events merged and consolidated.
    pub events: u64,
    /// Lines decoded into events, across channels.
    pub accepted_lines: u64,
    /// Malformed lines skipped, across channels.
    pub rejected_lines: u64,
    /// Events dropped for arriving out of order within their channel.
    pub out_of_order: u64,
    /// Distinct contracts seen.
    pub instruments: usize,
    /// Consolidators created.
    pub consolidators: usize,
    /// Bars written (staged files or in-memory entries).
    pub bars_written: u64,
    /// Archives written.
    pub archives_succeeded: usize,
    /// Archives that failed to package.
    pub archives_failed: usize,
    /// Wall time in milliseconds.
    pub elapsed_ms: u64,
}

impl ConversionSummary {
    /// Whether every channel and archive completed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed_channels.is_empty() && self.archives_failed == 0
    }
}
