//! Producer-side stream writer.
//!
//! This module provides:
//! - [`LogWriter`] — Writes the tagged header, entries and the terminator
//! - Gzip-wrapped construction for compressed files
//! - Timestamp coercion so emitted entries are strictly ascending
//!
//! The writer coerces every emitted timestamp through [`LogTime::next`],
//! so a stream produced by one writer always satisfies the ordering
//! invariant readers and indexers rely on.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use uuid::Uuid;

use crate::codec;
use crate::entry::{CloseData, EntryData, GroupConclusion, LogEntry, MulticastEntry, StreamEntry};
use crate::error::Result;
use crate::header::{write_header, CURRENT_VERSION};
use crate::level::Level;
use crate::tags::TagSet;
use crate::time::LogTime;

/// Writes a ckmon stream to an underlying sink.
///
/// Dropping an unclosed writer makes a best-effort attempt to terminate
/// the stream; call [`LogWriter::close`] to observe errors.
pub struct LogWriter<W: Write> {
    sink: Option<W>,
    last_time: LogTime,
}

impl LogWriter<BufWriter<File>> {
    /// Creates a buffered file writer at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the header
    /// cannot be written.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl LogWriter<GzEncoder<BufWriter<File>>> {
    /// Creates a gzip-compressed buffered file writer at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the header
    /// cannot be written.
    pub fn create_compressed(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(GzEncoder::new(
            BufWriter::new(File::create(path)?),
            Compression::default(),
        ))
    }
}

impl<W: Write> LogWriter<W> {
    /// Creates a writer over the given sink, emitting the tagged header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new(mut sink: W) -> Result<Self> {
        write_header(&mut sink, CURRENT_VERSION)?;
        Ok(Self {
            sink: Some(sink),
            last_time: LogTime::undefined(),
        })
    }

    /// Creates a gzip-wrapping writer over the given sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn compressed(sink: W) -> Result<LogWriter<GzEncoder<W>>> {
        LogWriter::new(GzEncoder::new(sink, Compression::default()))
    }

    /// Returns the last timestamp the writer emitted.
    #[must_use]
    pub const fn last_time(&self) -> LogTime {
        self.last_time
    }

    /// Emits an entry, coercing its timestamp to keep the stream
    /// strictly ascending. Returns the timestamp actually written.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the writer is closed.
    pub fn emit(&mut self, entry: LogEntry) -> Result<LogTime> {
        let time = self.coerce_time(entry.time());
        let entry = entry.with_time(time);
        self.write_raw(&StreamEntry::Unicast(entry))?;
        Ok(time)
    }

    /// Emits an entry on behalf of a monitor, with its nesting depth.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the writer is closed.
    pub fn emit_multicast(
        &mut self,
        monitor_id: Uuid,
        depth: i32,
        entry: LogEntry,
    ) -> Result<LogTime> {
        let time = self.coerce_time(entry.time());
        let entry = entry.with_time(time);
        self.write_raw(&StreamEntry::Multicast(MulticastEntry {
            monitor_id,
            depth,
            entry,
        }))?;
        Ok(time)
    }

    /// Emits a log line at the current instant.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn line(&mut self, level: Level, tags: TagSet, text: impl Into<String>) -> Result<LogTime> {
        self.emit(LogEntry::Line(
            EntryData::new(level, LogTime::now(), text).with_tags(tags),
        ))
    }

    /// Opens a group at the current instant.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn open_group(
        &mut self,
        level: Level,
        tags: TagSet,
        text: impl Into<String>,
    ) -> Result<LogTime> {
        self.emit(LogEntry::OpenGroup(
            EntryData::new(level, LogTime::now(), text).with_tags(tags),
        ))
    }

    /// Closes a group at the current instant with its conclusions.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn close_group(
        &mut self,
        level: Level,
        conclusions: Vec<GroupConclusion>,
    ) -> Result<LogTime> {
        self.emit(LogEntry::CloseGroup(CloseData {
            level,
            filtered: false,
            time: LogTime::now(),
            conclusions,
        }))
    }

    /// Emits a log line on behalf of a monitor.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn multicast_line(
        &mut self,
        monitor_id: Uuid,
        depth: i32,
        level: Level,
        tags: TagSet,
        text: impl Into<String>,
    ) -> Result<LogTime> {
        self.emit_multicast(
            monitor_id,
            depth,
            LogEntry::Line(EntryData::new(level, LogTime::now(), text).with_tags(tags)),
        )
    }

    /// Opens a group on behalf of a monitor.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn multicast_open(
        &mut self,
        monitor_id: Uuid,
        depth: i32,
        level: Level,
        tags: TagSet,
        text: impl Into<String>,
    ) -> Result<LogTime> {
        self.emit_multicast(
            monitor_id,
            depth,
            LogEntry::OpenGroup(EntryData::new(level, LogTime::now(), text).with_tags(tags)),
        )
    }

    /// Closes a group on behalf of a monitor.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn multicast_close(
        &mut self,
        monitor_id: Uuid,
        depth: i32,
        level: Level,
        conclusions: Vec<GroupConclusion>,
    ) -> Result<LogTime> {
        self.emit_multicast(
            monitor_id,
            depth,
            LogEntry::CloseGroup(CloseData {
                level,
                filtered: false,
                time: LogTime::now(),
                conclusions,
            }),
        )
    }

    /// Writes an entry verbatim, without timestamp coercion.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the writer is closed.
    pub fn write_raw(&mut self, entry: &StreamEntry) -> Result<()> {
        let sink = self.sink.as_mut().ok_or_else(closed_error)?;
        codec::encode_entry(sink, entry)?;
        let time = entry.time();
        if time > self.last_time {
            self.last_time = time;
        }
        Ok(())
    }

    /// Writes the terminator, flushes, and returns the underlying sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminator or flush fails, or the writer
    /// was already closed.
    pub fn close(mut self) -> Result<W> {
        let mut sink = self.sink.take().ok_or_else(closed_error)?;
        codec::write_terminator(&mut sink)?;
        sink.flush()?;
        Ok(sink)
    }

    fn coerce_time(&mut self, requested: LogTime) -> LogTime {
        let time = if requested > self.last_time {
            requested
        } else {
            LogTime::next(self.last_time, requested.instant())
        };
        self.last_time = time;
        time
    }
}

impl<W: Write> LogWriter<GzEncoder<W>> {
    /// Closes the writer and finishes the gzip member, returning the
    /// innermost sink.
    ///
    /// # Errors
    ///
    /// Returns an error if closing or finishing fails.
    pub fn finish(self) -> Result<W> {
        let encoder = self.close()?;
        Ok(encoder.finish()?)
    }
}

impl<W: Write> Drop for LogWriter<W> {
    fn drop(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            let _ = codec::write_terminator(&mut sink);
            let _ = sink.flush();
        }
    }
}

fn closed_error() -> crate::error::FormatError {
    crate::error::FormatError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "writer already closed",
    ))
}
