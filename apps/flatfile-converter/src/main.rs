//! Flatfile Converter Binary
//!
//! Converts one trading date of options channel files into bar archives.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin flatfile-converter -- config.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `CONVERTER_CONFIG`: config path when no argument is given (default: config.yaml)
//! - `RUST_LOG`: Log level (default: flatfile_converter=info)
//! - `LOG_ANSI`: set to `false` to disable colored logs
//!
//! Any `${VAR}` referenced by the config file may also be set in `.env`.

use anyhow::Context;
use flatfile_converter::config::{DEFAULT_CONFIG_PATH, load_config};
use flatfile_converter::telemetry::init_tracing;
use flatfile_converter::{ConvertError, Converter};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CONVERTER_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    tracing::info!(config = %config_path, "Starting flatfile converter");

    let config = load_config(Some(config_path.as_str()))
        .with_context(|| format!("loading config from {config_path}"))?;
    let converter = Converter::new(config.to_settings())?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping conversion");
            signal_token.cancel();
        }
    });

    let run_token = cancel.clone();
    let outcome = tokio::task::spawn_blocking(move || converter.run(&run_token))
        .await
        .context("conversion task panicked")?;

    match outcome {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if !summary.is_clean() {
                tracing::warn!(
                    failed_channels = summary.failed_channels.len(),
                    archives_failed = summary.archives_failed,
                    "Conversion finished with failures"
                );
            }
            Ok(())
        }
        Err(ConvertError::Cancelled) => {
            tracing::warn!("Conversion cancelled");
            std::process::exit(130);
        }
        Err(e) => Err(e.into()),
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
