//! Staged output files.
//!
//! A sink is opened for one flush of one consolidator and closed right
//! after, so open handles stay bounded no matter how many contracts are
//! active.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use super::format::LineFormatter;
use super::path::{PathResolver, normalize_entry_name, normalize_path};
use crate::domain::{DataKind, InstrumentIdentity, Resolution};
use crate::error::{ConvertError, Result};

/// Everything a flush needs to write staged files.
#[derive(Clone, Copy)]
pub struct OutputContext<'a> {
    /// Root the staged directories are created under.
    pub staging_root: &'a Path,
    /// Trading date being converted.
    pub date: NaiveDate,
    /// Archive layout.
    pub resolver: &'a dyn PathResolver,
    /// Line serialization.
    pub formatter: &'a dyn LineFormatter,
}

impl std::fmt::Debug for OutputContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputContext")
            .field("staging_root", &self.staging_root)
            .field("date", &self.date)
            .finish_non_exhaustive()
    }
}

impl OutputContext<'_> {
    /// Staged directory for one archive: its relative path without `.zip`.
    #[must_use]
    pub fn staged_directory(&self, instrument: &InstrumentIdentity, resolution: Resolution) -> PathBuf {
        staged_directory(
            self.staging_root,
            self.resolver,
            instrument,
            self.date,
            resolution,
        )
    }
}

/// Staged directory for the archive of `instrument` at `resolution`.
#[must_use]
pub fn staged_directory(
    staging_root: &Path,
    resolver: &dyn PathResolver,
    instrument: &InstrumentIdentity,
    date: NaiveDate,
    resolution: Resolution,
) -> PathBuf {
    // Kind does not contribute to the archive path.
    let archive = resolver.relative_archive_path(instrument, date, resolution, DataKind::Trade);
    staging_root.join(normalize_path(&archive.with_extension("")))
}

/// Appends lines to one staged entry file.
///
/// The file handle is released when the sink is dropped; call
/// [`OutputSink::finish`] to observe flush errors.
#[derive(Debug)]
pub struct OutputSink {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: u64,
}

impl OutputSink {
    /// Open (or append to) the staged entry for one target, creating
    /// directories as needed.
    pub fn open(
        context: &OutputContext<'_>,
        instrument: &InstrumentIdentity,
        resolution: Resolution,
        kind: DataKind,
    ) -> Result<Self> {
        let directory = context.staged_directory(instrument, resolution);
        let entry = context
            .resolver
            .entry_name(instrument, context.date, resolution, kind);
        let path = directory.join(normalize_entry_name(&entry));

        fs::create_dir_all(&directory).map_err(|e| ConvertError::sink(&directory, e))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ConvertError::sink(&path, e))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        })
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written through this sink.
    #[must_use]
    pub const fn lines(&self) -> u64 {
        self.lines
    }

    /// Append one line; a newline is added.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .map_err(|e| ConvertError::sink(&self.path, e))?;
        self.lines += 1;
        Ok(())
    }

    /// Flush buffered lines and close the file.
    pub fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .map_err(|e| ConvertError::sink(&self.path, e))?;
        Ok(self.lines)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    use super::*;
    use crate::domain::{DEFAULT_MARKET, OptionRight};
    use crate::output::{CsvLineFormatter, OptionPathResolver};

    fn contract(underlying: &str) -> InstrumentIdentity {
        InstrumentIdentity::american(
            underlying,
            NaiveDate::from_ymd_opt(2024, 1, 19).unwrap(),
            dec!(475),
            OptionRight::Call,
            DEFAULT_MARKET,
        )
    }

    #[test]
    fn test_sink_appends_across_opens() {
        let dir = tempdir().unwrap();
        let context = OutputContext {
            staging_root: dir.path(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            resolver: &OptionPathResolver,
            formatter: &CsvLineFormatter,
        };
        let spy = contract("SPY");

        let mut sink = OutputSink::open(&context, &spy, Resolution::Minute, DataKind::Trade).unwrap();
        sink.write_line("a").unwrap();
        let path = sink.path().to_path_buf();
        assert_eq!(sink.finish().unwrap(), 1);

        let mut sink = OutputSink::open(&context, &spy, Resolution::Minute, DataKind::Trade).unwrap();
        sink.write_line("b").unwrap();
        sink.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
        assert_eq!(
            path,
            dir.path().join(
                "option/usa/minute/spy/20240102_call_4750000_20240119/\
                 20240102_spy_minute_trade_american_call_4750000_20240119.csv"
            )
        );
    }

    #[test]
    fn test_reserved_underlying_renamed() {
        let dir = tempdir().unwrap();
        let context = OutputContext {
            staging_root: dir.path(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            resolver: &OptionPathResolver,
            formatter: &CsvLineFormatter,
        };

        let sink = OutputSink::open(&context, &contract("AUX"), Resolution::Tick, DataKind::Quote).unwrap();
        let path = sink.path().to_path_buf();
        sink.finish().unwrap();

        assert!(path.starts_with(dir.path().join("option/usa/tick/^aux")));
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("20240102_^aux_tick_quote")
        );
    }
}
