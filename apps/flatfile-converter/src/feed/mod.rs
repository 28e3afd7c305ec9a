//! Channel ingestion.
//!
//! ```text
//! channel file ──> ChannelReader ──> BufferedChannel ──┐
//! channel file ──> ChannelReader ──> BufferedChannel ──┼──> StreamMerger ──> events
//! channel file ──> ChannelReader ──> BufferedChannel ──┘
//! ```
//!
//! Each channel file is time-sorted on its own. The merger produces one
//! time-ordered stream across all of them.

mod buffered;
mod merge;
mod parser;
mod reader;

pub use buffered::{BufferedChannel, DEFAULT_BUFFER_MAX};
pub use merge::{SourceFailure, StreamMerger};
pub use parser::{COLUMN_COUNT, KIND_OFFSET, RecordParser, classify};
pub use reader::{ChannelReader, ReaderStats};
