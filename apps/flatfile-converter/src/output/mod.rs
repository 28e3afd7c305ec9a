//! Output layout, serialization, staging and archive packaging.
//!
//! - [`LineFormatter`]: one bar to one text line
//! - [`PathResolver`]: archive paths and entry names
//! - [`OutputSink`]: transient writer for one staged entry file
//! - [`Archiver`]: zips staged directories or in-memory entries

mod archive;
mod format;
mod path;
mod sink;

pub use archive::{
    ArchiveFailure, ArchiveJob, ArchiveReport, Archiver, MemoryEntry, archive_staged_directory,
    write_archive,
};
pub use format::{CsvLineFormatter, LineFormatter};
pub use path::{
    OptionPathResolver, ParsedEntry, PathResolver, RESERVED_PREFIX, denormalize_component,
    is_reserved_name, normalize_component, normalize_entry_name, normalize_path,
    parse_entry_name,
};
pub use sink::{OutputContext, OutputSink, staged_directory};
