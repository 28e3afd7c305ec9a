//! Configuration for the flat-file converter.
//!
//! Loads a YAML file, interpolates environment variables, and validates
//! the result.
//!
//! # Usage
//!
//! ```rust,ignore
//! use flatfile_converter::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("convert/20240102.yaml"))?;
//!
//! println!("date: {}", config.conversion.date);
//! ```
//!
//! # Example
//!
//! ```yaml
//! conversion:
//!   date: "2024-01-02"
//!   source_dir: ${RAW_DATA_DIR:-/data/raw}/20240102
//!   destination_dir: /data/out
//!   resolutions: [minute, second]
//!   mode: staged
//! channels:
//!   buffer_max: 10000
//! flush:
//!   interval_events: 1000000
//! archive:
//!   threads: 0
//!   remove_staged: true
//! ```

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::converter::{ConverterSettings, ProcessingMode};
use crate::domain::{DEFAULT_MARKET, Resolution};
use crate::feed::DEFAULT_BUFFER_MAX;

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// What to convert and where to put it.
    pub conversion: ConversionConfig,
    /// Channel read-ahead.
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Staged flush cadence.
    #[serde(default)]
    pub flush: FlushConfig,
    /// Archive packaging.
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Inputs, outputs and processing policy for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Trading date every event time is anchored to.
    pub date: NaiveDate,
    /// Directory holding the channel files for `date`.
    pub source_dir: PathBuf,
    /// Root the archives are written under.
    pub destination_dir: PathBuf,
    /// Root for staged files. Defaults to `<destination_dir>/.staging`.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Resolutions to produce.
    #[serde(default = "default_resolutions")]
    pub resolutions: Vec<Resolution>,
    /// Staged-to-disk or in-memory processing.
    #[serde(default)]
    pub mode: ProcessingMode,
    /// Market recorded on every contract.
    #[serde(default = "default_market")]
    pub market: String,
    /// Channel file extensions to pick up (empty = every file).
    #[serde(default = "default_file_extensions")]
    pub file_extensions: Vec<String>,
}

fn default_resolutions() -> Vec<Resolution> {
    vec![Resolution::Minute]
}

fn default_market() -> String {
    DEFAULT_MARKET.to_string()
}

fn default_file_extensions() -> Vec<String> {
    vec!["csv".to_string(), "gz".to_string()]
}

/// Channel read-ahead settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Queue capacity per channel.
    #[serde(default = "default_buffer_max")]
    pub buffer_max: usize,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            buffer_max: default_buffer_max(),
        }
    }
}

const fn default_buffer_max() -> usize {
    DEFAULT_BUFFER_MAX
}

/// Staged flush settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushConfig {
    /// Events merged between periodic flushes (staged mode only).
    #[serde(default = "default_interval_events")]
    pub interval_events: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_events: default_interval_events(),
        }
    }
}

const fn default_interval_events() -> u64 {
    1_000_000
}

/// Archive packaging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Packaging threads; 0 uses the global rayon pool.
    #[serde(default)]
    pub threads: usize,
    /// Delete staged directories once archived.
    #[serde(default = "default_true")]
    pub remove_staged: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            remove_staged: true,
        }
    }
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Converter settings for this configuration.
    #[must_use]
    pub fn to_settings(&self) -> ConverterSettings {
        let conversion = &self.conversion;
        ConverterSettings {
            date: conversion.date,
            source_dir: conversion.source_dir.clone(),
            destination_dir: conversion.destination_dir.clone(),
            staging_dir: conversion
                .staging_dir
                .clone()
                .unwrap_or_else(|| conversion.destination_dir.join(".staging")),
            resolutions: conversion.resolutions.clone(),
            mode: conversion.mode,
            market: conversion.market.clone(),
            file_extensions: conversion.file_extensions.clone(),
            buffer_max: self.channels.buffer_max,
            flush_interval: self.flush.interval_events,
            archive_threads: self.archive.threads,
            remove_staged: self.archive.remove_staged,
        }
    }
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let conversion = &config.conversion;

    if conversion.source_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "conversion.source_dir must not be empty".to_string(),
        ));
    }

    if conversion.destination_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "conversion.destination_dir must not be empty".to_string(),
        ));
    }

    if conversion.resolutions.is_empty() {
        return Err(ConfigError::ValidationError(
            "conversion.resolutions must name at least one resolution".to_string(),
        ));
    }

    if conversion.market.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "conversion.market must not be empty".to_string(),
        ));
    }

    if config.channels.buffer_max == 0 {
        return Err(ConfigError::ValidationError(
            "channels.buffer_max must be positive".to_string(),
        ));
    }

    if config.flush.interval_events == 0 {
        return Err(ConfigError::ValidationError(
            "flush.interval_events must be positive".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
conversion:
  date: "2024-01-02"
  source_dir: /data/raw/20240102
  destination_dir: /data/out
"#;

    #[test]
    fn test_load_minimal_config() {
        let config = match load_config_from_string(MINIMAL) {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };

        assert_eq!(
            config.conversion.date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(config.conversion.resolutions, vec![Resolution::Minute]);
        assert_eq!(config.conversion.mode, ProcessingMode::Staged);
        assert_eq!(config.conversion.market, "usa");
        assert_eq!(config.channels.buffer_max, DEFAULT_BUFFER_MAX);
        assert_eq!(config.flush.interval_events, 1_000_000);
        assert!(config.archive.remove_staged);
    }

    #[test]
    fn test_settings_default_staging_dir() {
        let settings = load_config_from_string(MINIMAL).unwrap().to_settings();
        assert_eq!(settings.staging_dir, PathBuf::from("/data/out/.staging"));
    }

    #[test]
    fn test_load_full_config() {
        let yaml = r#"
conversion:
  date: "2024-01-02"
  source_dir: /raw
  destination_dir: /out
  staging_dir: /scratch
  resolutions: [tick, second, daily]
  mode: in_memory
  market: usa
  file_extensions: [csv]
channels:
  buffer_max: 64
flush:
  interval_events: 500
archive:
  threads: 4
  remove_staged: false
"#;
        let settings = load_config_from_string(yaml).unwrap().to_settings();

        assert_eq!(
            settings.resolutions,
            vec![Resolution::Tick, Resolution::Second, Resolution::Daily]
        );
        assert_eq!(settings.mode, ProcessingMode::InMemory);
        assert_eq!(settings.staging_dir, PathBuf::from("/scratch"));
        assert_eq!(settings.buffer_max, 64);
        assert_eq!(settings.flush_interval, 500);
        assert_eq!(settings.archive_threads, 4);
        assert!(!settings.remove_staged);
    }

    #[test]
    fn test_rejects_empty_resolutions() {
        let yaml = format!("{MINIMAL}  resolutions: []\n");
        let err = load_config_from_string(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_rejects_zero_buffer() {
        let yaml = format!("{MINIMAL}channels:\n  buffer_max: 0\n");
        let err = load_config_from_string(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let yaml = format!("{MINIMAL}  mode: streaming\n");
        assert!(matches!(
            load_config_from_string(&yaml),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "dir: ${FLATFILE_CONFIG_TEST_NONEXISTENT_VAR:-/data/raw}";
        assert_eq!(interpolate_env_vars(input), "dir: /data/raw");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn test_env_var_with_default_uses_existing() {
        // PATH should always exist
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);

        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "market: ${FLATFILE_CONFIG_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "market: ");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some("/nonexistent/flatfile.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
