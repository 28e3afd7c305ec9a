//! Conversion driver.
//!
//! Owns every channel, the merger and the consolidator dictionary for one
//! run. The merge loop runs on the calling thread; nothing here is shared.
//!
//! ```text
//! discover ─> open channels ─> merge loop ─┬─> periodic flush (staged)
//!                                          └─> final flush ─> package archives
//! ```

mod discovery;
mod summary;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use discovery::discover_channel_files;
pub use summary::ConversionSummary;

use crate::consolidation::ConsolidatorSet;
use crate::domain::{DataKind, InstrumentIdentity, Resolution};
use crate::error::{ConvertError, Result};
use crate::feed::{BufferedChannel, ChannelReader, RecordParser, StreamMerger};
use crate::observability::{
    record_bars_written, record_channel_records, record_queue_high_water, record_run,
};
use crate::output::{
    ArchiveJob, Archiver, CsvLineFormatter, LineFormatter, MemoryEntry, OptionPathResolver,
    OutputContext, PathResolver, normalize_entry_name, normalize_path,
};

/// Events between progress log lines.
pub const PROGRESS_LOG_INTERVAL: u64 = 1_000_000;

/// Where bars live between consolidation and packaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Flush to staged files during the run, then zip each staged directory.
    #[default]
    Staged,
    /// Keep every bar in memory and write archives directly at the end.
    InMemory,
}

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct ConverterSettings {
    /// Trading date.
    pub date: NaiveDate,
    /// Directory holding the channel files.
    pub source_dir: PathBuf,
    /// Archive root.
    pub destination_dir: PathBuf,
    /// Staged file root.
    pub staging_dir: PathBuf,
    /// Resolutions to produce.
    pub resolutions: Vec<Resolution>,
    /// Staged or in-memory.
    pub mode: ProcessingMode,
    /// Market recorded on every contract.
    pub market: String,
    /// Channel file extensions (empty = all files).
    pub file_extensions: Vec<String>,
    /// Queue capacity per channel.
    pub buffer_max: usize,
    /// Events between periodic flushes in staged mode.
    pub flush_interval: u64,
    /// Archive packaging threads (0 = global pool).
    pub archive_threads: usize,
    /// Delete staged directories after archiving.
    pub remove_staged: bool,
}

/// Converts one date of channel files into bar archives.
pub struct Converter {
    settings: ConverterSettings,
    resolver: Box<dyn PathResolver>,
    formatter: Box<dyn LineFormatter>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Mutable state of the merge loop.
struct RunState {
    sets: Vec<ConsolidatorSet>,
    index: HashMap<InstrumentIdentity, usize>,
    touched: HashSet<usize>,
    frontier: NaiveDateTime,
    events: u64,
}

impl Converter {
    /// Create a converter with the default option layout and CSV lines.
    ///
    /// Resolutions are de-duplicated and sorted.
    pub fn new(mut settings: ConverterSettings) -> Result<Self> {
        settings.resolutions.sort_unstable();
        settings.resolutions.dedup();
        if settings.resolutions.is_empty() {
            return Err(ConvertError::Config("no resolutions requested".to_string()));
        }
        if settings.flush_interval == 0 {
            return Err(ConvertError::Config("flush interval must be positive".to_string()));
        }
        Ok(Self {
            settings,
            resolver: Box::new(OptionPathResolver),
            formatter: Box::new(CsvLineFormatter),
        })
    }

    /// Replace the archive layout.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Replace the line format.
    #[must_use]
    pub fn with_formatter(mut self, formatter: impl LineFormatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &ConverterSettings {
        &self.settings
    }

    fn output_context(&self) -> OutputContext<'_> {
        OutputContext {
            staging_root: &self.settings.staging_dir,
            date: self.settings.date,
            resolver: self.resolver.as_ref(),
            formatter: self.formatter.as_ref(),
        }
    }

    /// Run the conversion.
    ///
    /// Blocks until every channel is merged and every archive is packaged.
    /// `cancel` is checked once per merged event.
    ///
    /// # Errors
    ///
    /// Returns an error if the source directory cannot be listed, a stale
    /// staged directory cannot be removed, a staged write fails, or the run is cancelled. Channel and archive failures
    /// are reported in the summary instead.
    pub fn run(&self, cancel: &CancellationToken) -> Result<ConversionSummary> {
        let start = Instant::now();
        let settings = &self.settings;
        info!(
            date = %settings.date,
            source_dir = %settings.source_dir.display(),
            mode = ?settings.mode,
            resolutions = ?settings.resolutions,
            "Starting conversion"
        );

        let files = discover_channel_files(&settings.source_dir, &settings.file_extensions)?;
        let mut failed_channels = Vec::new();
        let channels = self.open_channels(&files, &mut failed_channels);

        let mut merger = StreamMerger::new(
            channels
                .into_iter()
                .map(|channel| (channel.name().to_string(), channel)),
        );

        let staged = settings.mode == ProcessingMode::Staged;
        let context = self.output_context();
        let output = staged.then_some(&context);

        let mut state = RunState {
            sets: Vec::new(),
            index: HashMap::new(),
            touched: HashSet::new(),
            frontier: NaiveDateTime::MIN,
            events: 0,
        };

        for event in merger.by_ref() {
            if cancel.is_cancelled() {
                warn!(events = state.events, "Conversion cancelled");
                return Err(ConvertError::Cancelled);
            }

            let slot = match state.index.get(&event.instrument) {
                Some(&slot) => slot,
                None => {
                    if staged {
                        self.clear_staged(&context, &event.instrument)?;
                    }
                    let slot = state.sets.len();
                    state.sets.push(ConsolidatorSet::new(
                        event.instrument.clone(),
                        &settings.resolutions,
                    ));
                    state.index.insert(event.instrument.clone(), slot);
                    slot
                }
            };
            state.sets[slot].process(&event);
            state.frontier = event.time;
            state.touched.insert(slot);
            state.events += 1;

            if staged && state.events % settings.flush_interval == 0 {
                let mut written = 0;
                for slot in state.touched.drain() {
                    written += state.sets[slot].flush(state.frontier, false, output)?;
                }
                debug!(frontier = %state.frontier, bars = written, "Periodic flush");
            }

            if state.events % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    events = state.events,
                    instruments = state.sets.len(),
                    frontier = %state.frontier,
                    "Conversion progress"
                );
            }
        }

        let (accepted_lines, rejected_lines) = Self::collect_channel_stats(&merger);
        let out_of_order = merger.out_of_order();
        for failure in merger.into_failures() {
            failed_channels.push(failure.source);
        }

        for set in &mut state.sets {
            set.flush(NaiveDateTime::MAX, true, output)?;
        }

        let (jobs, bars_written) = if staged {
            let written = state.sets.iter().map(ConsolidatorSet::written).sum();
            (self.staged_jobs(&state.sets), written)
        } else {
            self.memory_jobs(&mut state.sets)
        };

        let report = Archiver::new(settings.archive_threads, settings.remove_staged).run(jobs);

        let elapsed = start.elapsed();
        record_run(state.events, elapsed.as_secs_f64());

        let summary = ConversionSummary {
            date: settings.date,
            mode: settings.mode,
            files: files.len(),
            failed_channels,
            events: state.events,
            accepted_lines,
            rejected_lines,
            out_of_order,
            instruments: state.sets.len(),
            consolidators: state.sets.iter().map(ConsolidatorSet::len).sum(),
            bars_written,
            archives_succeeded: report.succeeded,
            archives_failed: report.failures.len(),
            elapsed_ms: elapsed.as_millis() as u64,
        };

        info!(
            events = summary.events,
            instruments = summary.instruments,
            bars = summary.bars_written,
            archives = summary.archives_succeeded,
            archive_failures = summary.archives_failed,
            failed_channels = summary.failed_channels.len(),
            elapsed_ms = summary.elapsed_ms,
            "Conversion complete"
        );
        Ok(summary)
    }

    fn open_channels(
        &self,
        files: &[PathBuf],
        failed: &mut Vec<String>,
    ) -> Vec<BufferedChannel> {
        let settings = &self.settings;
        let mut channels = Vec::with_capacity(files.len());
        for path in files {
            let parser = RecordParser::new(settings.date, settings.market.as_str());
            let opened = ChannelReader::open(path, parser)
                .and_then(|reader| BufferedChannel::spawn(reader, settings.buffer_max));
            match opened {
                Ok(channel) => channels.push(channel),
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Skipping channel");
                    failed.push(path.display().to_string());
                }
            }
        }
        info!(channels = channels.len(), failed = failed.len(), "Channels opened");
        channels
    }

    fn collect_channel_stats(merger: &StreamMerger<BufferedChannel>) -> (u64, u64) {
        let mut accepted = 0;
        let mut rejected = 0;
        for channel in merger.sources() {
            let stats = channel.stats();
            record_channel_records(channel.name(), stats.accepted, stats.rejected);
            record_queue_high_water(channel.name(), channel.high_water_mark());
            accepted += stats.accepted;
            rejected += stats.rejected;
        }
        (accepted, rejected)
    }

    fn archive_path(&self, instrument: &InstrumentIdentity, resolution: Resolution) -> PathBuf {
        let relative = self.resolver.relative_archive_path(
            instrument,
            self.settings.date,
            resolution,
            DataKind::Trade,
        );
        self.settings.destination_dir.join(normalize_path(&relative))
    }

    /// Remove staged directories an earlier run left for `instrument`.
    ///
    /// Called before the contract's first flush, so staged entries only
    /// ever hold bars from this run.
    fn clear_staged(&self, context: &OutputContext<'_>, instrument: &InstrumentIdentity) -> Result<()> {
        for &resolution in &self.settings.resolutions {
            let directory = context.staged_directory(instrument, resolution);
            if directory.is_dir() {
                fs::remove_dir_all(&directory).map_err(|e| ConvertError::sink(&directory, e))?;
                debug!(directory = %directory.display(), "Removed stale staged directory");
            }
        }
        Ok(())
    }

    fn staged_jobs(&self, sets: &[ConsolidatorSet]) -> Vec<ArchiveJob> {
        let context = self.output_context();
        let mut jobs = Vec::new();
        for set in sets {
            for &resolution in &self.settings.resolutions {
                let directory = context.staged_directory(set.instrument(), resolution);
                if directory.is_dir() {
                    jobs.push(ArchiveJob::Staged {
                        directory,
                        archive: self.archive_path(set.instrument(), resolution),
                    });
                }
            }
        }
        jobs
    }

    fn memory_jobs(&self, sets: &mut [ConsolidatorSet]) -> (Vec<ArchiveJob>, u64) {
        let date = self.settings.date;
        let mut jobs = Vec::new();
        let mut total = 0_u64;
        for set in sets {
            let instrument = set.instrument().clone();
            for &resolution in &self.settings.resolutions {
                let mut entries = Vec::new();
                for kind in DataKind::ALL {
                    let bars = set.take_pending(kind, resolution);
                    if bars.is_empty() {
                        continue;
                    }
                    let lines: Vec<String> = bars
                        .iter()
                        .map(|bar| self.formatter.format(bar, kind, resolution))
                        .collect();
                    record_bars_written(resolution.as_str(), kind.as_str(), lines.len() as u64);
                    total += lines.len() as u64;
                    let name = self.resolver.entry_name(&instrument, date, resolution, kind);
                    entries.push(MemoryEntry {
                        name: normalize_entry_name(&name),
                        lines,
                    });
                }
                if !entries.is_empty() {
                    jobs.push(ArchiveJob::InMemory {
                        archive: self.archive_path(&instrument, resolution),
                        entries,
                    });
                }
            }
        }
        (jobs, total)
    }
}
