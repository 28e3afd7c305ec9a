//! Zip packaging of converted output.
//!
//! Two sources feed an archive: a staged directory whose files become the
//! entries, or lines held in memory. Jobs are packaged in parallel and each
//! failure is isolated to its own target.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{ConvertError, Result};
use crate::observability::record_archive;

/// One archive entry held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    /// Entry file name.
    pub name: String,
    /// Lines in chronological order, without newlines.
    pub lines: Vec<String>,
}

/// One archive to produce.
#[derive(Debug, Clone)]
pub enum ArchiveJob {
    /// Zip every file of a staged directory.
    Staged {
        /// Staged directory.
        directory: PathBuf,
        /// Archive to write.
        archive: PathBuf,
    },
    /// Zip lines held in memory.
    InMemory {
        /// Archive to write.
        archive: PathBuf,
        /// Entries in write order.
        entries: Vec<MemoryEntry>,
    },
}

impl ArchiveJob {
    /// Archive this job writes.
    #[must_use]
    pub fn archive(&self) -> &Path {
        match self {
            Self::Staged { archive, .. } | Self::InMemory { archive, .. } => archive,
        }
    }
}

/// A target that could not be packaged.
#[derive(Debug)]
pub struct ArchiveFailure {
    /// Archive that failed.
    pub archive: PathBuf,
    /// Cause.
    pub error: ConvertError,
}

/// Outcome of packaging a batch of archives.
#[derive(Debug, Default)]
pub struct ArchiveReport {
    /// Archives written.
    pub succeeded: usize,
    /// Targets that failed.
    pub failures: Vec<ArchiveFailure>,
}

/// Packages jobs into zip archives.
#[derive(Debug, Clone, Copy)]
pub struct Archiver {
    threads: usize,
    remove_staged: bool,
}

impl Archiver {
    /// Create an archiver.
    ///
    /// `threads` of zero uses the global rayon pool. With `remove_staged`,
    /// a staged directory is deleted once its archive is written.
    #[must_use]
    pub const fn new(threads: usize, remove_staged: bool) -> Self {
        Self {
            threads,
            remove_staged,
        }
    }

    /// Package every job. Failures are logged and collected, never propagated.
    pub fn run(&self, jobs: Vec<ArchiveJob>) -> ArchiveReport {
        if jobs.is_empty() {
            return ArchiveReport::default();
        }
        let start = Instant::now();
        let total = jobs.len();

        let outcomes: Vec<(PathBuf, Result<()>)> = if self.threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .thread_name(|i| format!("archive-{i}"))
                .build()
            {
                Ok(pool) => pool.install(|| self.package_all(jobs)),
                Err(e) => {
                    warn!(error = %e, "Failed to build archive pool, using global pool");
                    self.package_all(jobs)
                }
            }
        } else {
            self.package_all(jobs)
        };

        let mut report = ArchiveReport::default();
        for (archive, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded += 1,
                Err(error) => {
                    warn!(archive = %archive.display(), error = %error, "Archive packaging failed");
                    report.failures.push(ArchiveFailure { archive, error });
                }
            }
        }

        info!(
            total,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Archive packaging complete"
        );
        report
    }

    fn package_all(&self, jobs: Vec<ArchiveJob>) -> Vec<(PathBuf, Result<()>)> {
        jobs.into_par_iter()
            .map(|job| {
                let start = Instant::now();
                let outcome = self.package(&job);
                record_archive(outcome.is_ok(), start.elapsed().as_secs_f64());
                (job.archive().to_path_buf(), outcome)
            })
            .collect()
    }

    fn package(&self, job: &ArchiveJob) -> Result<()> {
        match job {
            ArchiveJob::Staged { directory, archive } => {
                archive_staged_directory(directory, archive)?;
                if self.remove_staged {
                    fs::remove_dir_all(directory)
                        .map_err(|e| ConvertError::archive(archive, format!("removing staged directory: {e}")))?;
                }
                Ok(())
            }
            ArchiveJob::InMemory { archive, entries } => write_archive(archive, entries),
        }
    }
}

fn zip_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated)
}

fn create_archive(archive: &Path) -> Result<ZipWriter<BufWriter<File>>> {
    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent).map_err(|e| ConvertError::archive(archive, e.to_string()))?;
    }
    let file = File::create(archive).map_err(|e| ConvertError::archive(archive, e.to_string()))?;
    Ok(ZipWriter::new(BufWriter::new(file)))
}

fn finish_archive(archive: &Path, zip: ZipWriter<BufWriter<File>>) -> Result<()> {
    zip.finish()
        .map_err(|e| ConvertError::archive(archive, e.to_string()))?
        .flush()
        .map_err(|e| ConvertError::archive(archive, e.to_string()))
}

/// Zip every regular file in `directory` into `archive`, entries sorted by name.
pub fn archive_staged_directory(directory: &Path, archive: &Path) -> Result<usize> {
    let mut files: Vec<PathBuf> = fs::read_dir(directory)
        .map_err(|e| ConvertError::archive(archive, format!("reading {}: {e}", directory.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    let mut zip = create_archive(archive)?;
    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ConvertError::archive(archive, "staged file without a name"))?;
        zip.start_file(name, zip_options())
            .map_err(|e| ConvertError::archive(archive, e.to_string()))?;
        let mut source = File::open(path).map_err(|e| ConvertError::archive(archive, e.to_string()))?;
        std::io::copy(&mut source, &mut zip).map_err(|e| ConvertError::archive(archive, e.to_string()))?;
    }
    finish_archive(archive, zip)?;

    debug!(archive = %archive.display(), entries = files.len(), "Archived staged directory");
    Ok(files.len())
}

/// Write in-memory entries into `archive`.
pub fn write_archive(archive: &Path, entries: &[MemoryEntry]) -> Result<()> {
    let mut zip = create_archive(archive)?;
    for entry in entries {
        zip.start_file(entry.name.as_str(), zip_options())
            .map_err(|e| ConvertError::archive(archive, e.to_string()))?;
        for line in &entry.lines {
            zip.write_all(line.as_bytes())
                .and_then(|()| zip.write_all(b"\n"))
                .map_err(|e| ConvertError::archive(archive, e.to_string()))?;
        }
    }
    finish_archive(archive, zip)?;

    debug!(archive = %archive.display(), entries = entries.len(), "Wrote archive from memory");
    Ok(())
}
