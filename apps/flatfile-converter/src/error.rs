//! Error handling for the converter.
//!
//! Malformed feed lines are not errors: the record parser rejects them and
//! the reader moves on. Everything here is something a caller has to see.
//!
//! | Variant | Raised by | Effect |
//! |---------|-----------|--------|
//! | `Io` | channel readers, discovery | aborts that channel (or the run during discovery) |
//! | `UnsupportedOperation` | `ChannelReader::reset` | always fatal to the caller |
//! | `Channel` | buffered channel worker | channel removed from the merge |
//! | `Sink` | output sink | aborts the run, pending bars stay queued |
//! | `Archive` | archiver | isolated per target and counted |
//! | `Config` | config loading | aborts before the run starts |
//! | `Cancelled` | converter | run stopped by the operator |

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the conversion pipeline.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Reading an input file or directory failed.
    #[error("IO error on '{path}': {source}")]
    Io {
        /// File or directory being read.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Operation not supported by a forward-only reader.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// A channel worker stopped with an error.
    #[error("Channel '{channel}' failed: {message}")]
    Channel {
        /// Channel name (input file name).
        channel: String,
        /// Error message.
        message: String,
    },

    /// Writing a staged output file failed.
    #[error("Output sink error on '{path}': {source}")]
    Sink {
        /// Target file.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Packaging one archive failed.
    #[error("Archive error on '{path}': {message}")]
    Archive {
        /// Archive being written.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Invalid converter configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The run was cancelled before the merge finished.
    #[error("Conversion cancelled")]
    Cancelled,
}

impl ConvertError {
    /// Build an IO error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a sink error for `path`.
    pub fn sink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Sink {
            path: path.into(),
            source,
        }
    }

    /// Build an archive error for `path`.
    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the error stops the whole run rather than one channel or target.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Channel { .. } | Self::Archive { .. })
    }
}

/// Result alias for converter operations.
pub type Result<T> = std::result::Result<T, ConvertError>;
