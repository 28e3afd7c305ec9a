//! Forward-only cursor over one channel file.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, trace};

use super::parser::RecordParser;
use crate::domain::MarketEvent;
use crate::error::{ConvertError, Result};

const READ_BUFFER_BYTES: usize = 256 * 1024;

/// Line counters for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Lines decoded into events.
    pub accepted: u64,
    /// Non-blank lines the parser rejected.
    pub rejected: u64,
}

/// Single-pass reader producing validated events in file order.
///
/// [`ChannelReader::current`] is stable until the next call to
/// [`ChannelReader::advance`]. The reader cannot be rewound.
pub struct ChannelReader {
    name: String,
    path: PathBuf,
    source: Box<dyn BufRead + Send>,
    parser: RecordParser,
    current: Option<MarketEvent>,
    line: Vec<u8>,
    stats: ReaderStats,
    exhausted: bool,
}

impl std::fmt::Debug for ChannelReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelReader")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("current", &self.current)
            .field("stats", &self.stats)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl ChannelReader {
    /// Open a channel file. Files ending in `.gz` are decompressed on the fly.
    pub fn open(path: &Path, parser: RecordParser) -> Result<Self> {
        let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
        let is_gzip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

        let source: Box<dyn BufRead + Send> = if is_gzip {
            Box::new(BufReader::with_capacity(
                READ_BUFFER_BYTES,
                GzDecoder::new(file),
            ))
        } else {
            Box::new(BufReader::with_capacity(READ_BUFFER_BYTES, file))
        };

        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        debug!(channel = %name, gzip = is_gzip, "Opened channel file");
        Ok(Self::from_source(name, path.to_path_buf(), source, parser))
    }

    /// Build a reader over an arbitrary line source.
    #[must_use]
    pub fn from_reader<R: BufRead + Send + 'static>(
        name: impl Into<String>,
        source: R,
        parser: RecordParser,
    ) -> Self {
        let name = name.into();
        let path = PathBuf::from(&name);
        Self::from_source(name, path, Box::new(source), parser)
    }

    fn from_source(
        name: String,
        path: PathBuf,
        source: Box<dyn BufRead + Send>,
        parser: RecordParser,
    ) -> Self {
        Self {
            name,
            path,
            source,
            parser,
            current: None,
            line: Vec::new(),
            stats: ReaderStats::default(),
            exhausted: false,
        }
    }

    /// Channel name (file name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Move to the next valid event.
    ///
    /// Returns `Ok(false)` once the input is exhausted; `current` is then
    /// `None` and further calls keep returning `Ok(false)`.
    pub fn advance(&mut self) -> Result<bool> {
        self.current = None;
        if self.exhausted {
            return Ok(false);
        }

        loop {
            self.line.clear();
            let read = self
                .source
                .read_until(b'\n', &mut self.line)
                .map_err(|e| ConvertError::io(&self.path, e))?;
            if read == 0 {
                self.exhausted = true;
                debug!(
                    channel = %self.name,
                    accepted = self.stats.accepted,
                    rejected = self.stats.rejected,
                    "Channel exhausted"
                );
                return Ok(false);
            }

            // Invalid UTF-8 is just another malformed record.
            let Ok(line) = std::str::from_utf8(&self.line) else {
                self.stats.rejected += 1;
                continue;
            };
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }

            if let Some(event) = self.parser.parse(line) {
                self.stats.accepted += 1;
                self.current = Some(event);
                return Ok(true);
            }

            self.stats.rejected += 1;
            trace!(channel = %self.name, line = %line, "Rejected malformed record");
        }
    }

    /// Event produced by the last successful [`advance`](Self::advance).
    #[must_use]
    pub const fn current(&self) -> Option<&MarketEvent> {
        self.current.as_ref()
    }

    /// Whether the underlying input has been fully consumed.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Line counters so far.
    #[must_use]
    pub const fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Rewind the reader. Always fails: channel readers are forward-only.
    pub fn reset(&mut self) -> Result<()> {
        Err(ConvertError::UnsupportedOperation(
            "channel readers are forward-only and cannot be reset",
        ))
    }

    /// Advance and take ownership of the next event.
    pub fn next_event(&mut self) -> Result<Option<MarketEvent>> {
        if self.advance()? {
            Ok(self.current.take())
        } else {
            Ok(None)
        }
    }
}

impl Iterator for ChannelReader {
    type Item = Result<MarketEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}
