//! Observability module for conversion metrics.
//!
//! Logging goes through `tracing` directly; see [`crate::telemetry`] for
//! subscriber setup.

mod metrics;

pub use metrics::{
    record_archive, record_bars_written, record_channel_records, record_out_of_order,
    record_queue_high_water, record_run,
};
