//! Tracing Setup
//!
//! Initializes console logging for the converter binary.
//!
//! # Configuration
//!
//! - `RUST_LOG`: filter directives (default: `flatfile_converter=info`)
//! - `LOG_ANSI`: set to `false` to disable colored output (e.g. when piping to a file)
//!
//! # Usage
//!
//! ```rust,ignore
//! use flatfile_converter::telemetry::init_tracing;
//!
//! fn main() {
//!     init_tracing();
//!     // ... application code
//! }
//! ```

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "flatfile_converter=info";

/// Initialize the tracing subscriber with an environment filter.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let ansi = std::env::var("LOG_ANSI")
        .map(|v| v != "false")
        .unwrap_or(true);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let initialized = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(ansi)
        .try_init();

    if initialized.is_ok() {
        tracing::debug!(filter = DEFAULT_FILTER, "Tracing initialized");
    }
}
