//! Conversion metrics.
//!
//! Recorded through the `metrics` facade. The binary does not install an
//! exporter, so these are no-ops unless an embedding process installs a
//! recorder.

use metrics::{counter, gauge, histogram};

// ============================================================================
// Feed Metrics
// ============================================================================

/// Record parsed feed lines for one channel.
///
/// # Arguments
///
/// * `channel` - Channel name (input file name)
/// * `accepted` - Lines decoded into events
/// * `rejected` - Malformed or irrelevant lines skipped
pub fn record_channel_records(channel: &str, accepted: u64, rejected: u64) {
    counter!(
        "converter_records_total",
        "channel" => channel.to_string(),
        "outcome" => "accepted"
    )
    .increment(accepted);

    counter!(
        "converter_records_total",
        "channel" => channel.to_string(),
        "outcome" => "rejected"
    )
    .increment(rejected);
}

/// Record an event dropped for arriving out of timestamp order.
pub fn record_out_of_order(channel: &str) {
    counter!("converter_out_of_order_total", "channel" => channel.to_string()).increment(1);
}

/// Record the deepest a channel queue got during the run.
pub fn record_queue_high_water(channel: &str, depth: usize) {
    gauge!("converter_channel_queue_high_water", "channel" => channel.to_string())
        .set(depth as f64);
}

// ============================================================================
// Output Metrics
// ============================================================================

/// Record bars written by one flush.
///
/// # Arguments
///
/// * `resolution` - Resolution name (e.g., "minute")
/// * `kind` - Data kind (e.g., "trade", "quote")
/// * `count` - Bars written
pub fn record_bars_written(resolution: &str, kind: &str, count: u64) {
    counter!(
        "converter_bars_written_total",
        "resolution" => resolution.to_string(),
        "kind" => kind.to_string()
    )
    .increment(count);
}

/// Record the outcome of packaging one archive.
pub fn record_archive(success: bool, seconds: f64) {
    let outcome = if success { "success" } else { "failure" };
    counter!("converter_archives_total", "outcome" => outcome).increment(1);
    histogram!("converter_archive_seconds").record(seconds);
}

/// Record a finished run.
pub fn record_run(events: u64, seconds: f64) {
    counter!("converter_events_total").increment(events);
    histogram!("converter_run_seconds").record(seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // No global recorder is installed in unit tests.
        record_channel_records("a.csv", 10, 2);
        record_out_of_order("a.csv");
        record_queue_high_water("a.csv", 64);
        record_bars_written("minute", "trade", 3);
        record_archive(true, 0.01);
        record_archive(false, 0.02);
        record_run(100, 1.5);
    }
}
