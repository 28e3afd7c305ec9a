// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Flatfile Converter - Options Market Data Pipeline
//!
//! Converts one trading date of raw per-channel options feed files into
//! consolidated bar archives.
//!
//! # Pipeline
//!
//! ```text
//! channel files ─> RecordParser ─> ChannelReader ─> BufferedChannel (one thread each)
//!                                                        │
//!                                                  StreamMerger (time order)
//!                                                        │
//!                               Converter ─> ConsolidatorSet per contract
//!                                                        │
//!                                  OutputSink (staged) / in-memory ─> Archiver
//! ```
//!
//! ## Modules
//!
//! - **domain**: contracts, events, resolutions, bars
//! - **feed**: parsing, per-channel read-ahead, k-way merge
//! - **consolidation**: per-key bar state machines
//! - **output**: line format, archive layout, staged sinks, zip packaging
//! - **converter**: run driver and summary
//! - **config**: YAML configuration
//!
//! # Ordering
//!
//! Every channel file is assumed time-sorted. The merger checks this and
//! drops events that go backwards within their channel, so the merged
//! stream is always non-decreasing and the frontier is a valid signal to
//! close bars.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Pipeline
// =============================================================================

/// Domain types: contracts, events, resolutions, bars.
pub mod domain;

/// Channel parsing, buffering and merging.
pub mod feed;

/// Bar consolidation.
pub mod consolidation;

/// Output layout, serialization and packaging.
pub mod output;

/// Run driver.
pub mod converter;

// =============================================================================
// Cross-Cutting Concerns
// =============================================================================

/// Configuration loading.
pub mod config;

/// Error types.
pub mod error;

/// Conversion metrics.
pub mod observability;

/// Tracing setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{Config, ConfigError, load_config, load_config_from_string};
pub use converter::{ConversionSummary, Converter, ConverterSettings, ProcessingMode};
pub use domain::{Bar, DataKind, EventKind, InstrumentIdentity, MarketEvent, Resolution};
pub use error::{ConvertError, Result};
