//! # ckmon-format
//!
//! Binary wire format, writer and sequential reader for ckmon activity
//! logs.
//!
//! This crate provides:
//!
//! - [`LogEntry`] / [`StreamEntry`] — Lines, groups and multicast entries
//! - [`Level`] — Severity levels (Trace through Fatal)
//! - [`LogTime`] — Strictly ascending timestamps with tie-breaking
//! - [`TagSet`] — Immutable, interned tag sets
//! - [`LogWriter`] — Stream writer with optional gzip compression
//! - [`LogReader`] — Pull cursor with monitor filtering and replay
//! - [`open_stream`] — Header detection over raw or gzip-wrapped bytes
//!
//! ## Example
//!
//! ```rust
//! use ckmon_format::{Level, LogReader, LogWriter, TagSet};
//! use std::io::Cursor;
//!
//! # fn main() -> ckmon_format::Result<()> {
//! let mut writer = LogWriter::new(Vec::new())?;
//! writer.open_group(Level::Info, TagSet::empty(), "startup")?;
//! writer.line(Level::Trace, TagSet::intern("db"), "connected")?;
//! writer.close_group(Level::Info, Vec::new())?;
//! let bytes = writer.close()?;
//!
//! let mut reader = LogReader::from_stream(Cursor::new(bytes))?;
//! while let Some(entry) = reader.next_entry()? {
//!     println!("{}", entry.time());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod entry;
pub mod error;
pub mod header;
pub mod level;
pub mod reader;
pub mod tags;
pub mod time;
pub mod writer;

// Re-export main types
pub use entry::{
    CloseData, EntryData, ExceptionData, GroupConclusion, LogEntry, MulticastEntry, SourceRef,
    StreamEntry,
};
pub use error::{FormatError, Result};
pub use header::{open_stream, StreamHeader, CURRENT_VERSION};
pub use level::Level;
pub use reader::{LogReader, MonitorFilter, ReplaySink, SinkResolver};
pub use tags::TagSet;
pub use time::LogTime;
pub use writer::LogWriter;
