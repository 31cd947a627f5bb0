//! Sequential reader over a ckmon stream.
//!
//! This module provides:
//! - [`LogReader`] — A pull cursor over encoded entries
//! - [`MonitorFilter`] — Single-monitor filtering with an early-stop hint
//! - [`ReplaySink`] / [`SinkResolver`] — Replay destinations
//!
//! The reader tracks the logical stream offset (decompressed bytes for
//! gzip-wrapped files), so the offset of an entry is the same whether or
//! not the file was compressed. Offsets reported by
//! [`LogReader::current_offset`] are the position *before* the entry was
//! read; they are what callers persist as seek points.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use uuid::Uuid;

use crate::codec;
use crate::entry::{EntryData, GroupConclusion, LogEntry, StreamEntry};
use crate::error::{FormatError, Result};
use crate::header::{open_stream, CURRENT_VERSION};
use crate::time::LogTime;

/// Restricts a reader to one monitor's entries.
///
/// The `known_last_offset` hint bounds the scan: once the pre-entry
/// offset passes it the reader reports exhaustion without decoding the
/// rest of the file. The hint is authoritative; the index that produced
/// it is the source of truth for immutable files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorFilter {
    /// The monitor whose entries are surfaced.
    pub monitor_id: Uuid,
    /// Offset of the last entry known to belong to the monitor.
    pub known_last_offset: u64,
}

/// A destination for replayed entries.
pub trait ReplaySink {
    /// Receives a replayed log line.
    fn append_line(&mut self, data: &EntryData);

    /// Receives a replayed group opening.
    fn open_group(&mut self, data: &EntryData);

    /// Receives a replayed group closing with its conclusions.
    fn close_group(&mut self, time: LogTime, conclusions: &[GroupConclusion]);
}

/// Resolves a destination sink for multicast replay.
pub trait SinkResolver {
    /// Returns the sink for a monitor at a nesting depth, or `None` to
    /// skip its entries.
    fn resolve(&mut self, monitor_id: Uuid, depth: i32) -> Option<&mut dyn ReplaySink>;
}

struct CountingReader {
    inner: Box<dyn Read>,
    count: u64,
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

struct Pending {
    offset: u64,
    depth: Option<i32>,
    entry: StreamEntry,
}

/// A pull-based cursor over a stream of encoded entries.
///
/// A reader is a single-threaded cursor: it must not be advanced from
/// two threads. Closing (or dropping) releases the underlying stream
/// exactly once; closing twice is a no-op.
pub struct LogReader {
    stream: Option<CountingReader>,
    version: u32,
    base: u64,
    current_offset: u64,
    current_depth: Option<i32>,
    exhausted: bool,
    filter: Option<MonitorFilter>,
    pending: Option<Pending>,
    compressed: bool,
}

impl LogReader {
    /// Opens a log file, reading its header.
    ///
    /// Accepts any readable version; gzip-wrapped files are decompressed
    /// transparently.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its header is
    /// invalid.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_stream(BufReader::new(file))
    }

    /// Creates a reader over a stream, reading its header.
    ///
    /// Accepts any readable version.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid or its version is
    /// outside the readable set.
    pub fn from_stream<R: Read + 'static>(reader: R) -> Result<Self> {
        let (stream, header) = open_stream(reader)?;
        Ok(Self::assemble(
            stream,
            header.version,
            header.header_len,
            header.compressed,
        ))
    }

    /// Creates a reader over a stream, requiring the current version.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid or declares anything
    /// but the current version.
    pub fn from_stream_strict<R: Read + 'static>(reader: R) -> Result<Self> {
        let reader = Self::from_stream(reader)?;
        if reader.version != CURRENT_VERSION {
            return Err(FormatError::UnsupportedVersion(reader.version));
        }
        Ok(reader)
    }

    /// Resumes reading a header-less continuation at a known offset.
    ///
    /// The stream must already be positioned at `base_offset`; the
    /// version cannot be re-derived from the data and is supplied by the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is outside the readable set.
    pub fn resume<R: Read + 'static>(reader: R, version: u32, base_offset: u64) -> Result<Self> {
        if !(1..=CURRENT_VERSION).contains(&version) {
            return Err(FormatError::UnsupportedVersion(version));
        }
        Ok(Self::assemble(Box::new(reader), version, base_offset, false))
    }

    /// Restricts the reader to one monitor's entries.
    ///
    /// Surfaced entries are down-cast to their plain form; the depth of
    /// the last surfaced entry remains available through
    /// [`LogReader::current_depth`].
    #[must_use]
    pub fn with_filter(mut self, monitor_id: Uuid, known_last_offset: u64) -> Self {
        self.filter = Some(MonitorFilter {
            monitor_id,
            known_last_offset,
        });
        self
    }

    /// Returns the stream's declared version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns true if the stream was gzip-wrapped.
    #[must_use]
    pub const fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Returns true once the reader has reached the end of the stream.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Returns the logical offset of the entry surfaced by the last
    /// successful advance.
    #[must_use]
    pub const fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Returns the nesting depth of the last surfaced entry, when it
    /// carried one.
    #[must_use]
    pub const fn current_depth(&self) -> Option<i32> {
        self.current_depth
    }

    /// Returns the logical offset at which the next entry starts.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pending
            .as_ref()
            .map_or_else(|| self.raw_position(), |pending| pending.offset)
    }

    /// Reads the next entry, or `None` once the stream is exhausted.
    ///
    /// A missing trailing terminator is tolerated: end-of-stream while
    /// expecting a flags byte reports exhaustion, not an error. With a
    /// monitor filter active, entries of other producers are skipped and
    /// the scan gives up once the offset passes the filter's hint.
    ///
    /// # Errors
    ///
    /// Returns an error on any structural decoding problem. The reader
    /// does not recover mid-entry; callers may resume a new reader at a
    /// later known-good offset.
    pub fn next_entry(&mut self) -> Result<Option<StreamEntry>> {
        if let Some(pending) = self.pending.take() {
            self.current_offset = pending.offset;
            self.current_depth = pending.depth;
            return Ok(Some(pending.entry));
        }
        if self.exhausted || self.stream.is_none() {
            return Ok(None);
        }
        let filter = self.filter;
        loop {
            let at = self.raw_position();
            if let Some(filter) = filter {
                if at > filter.known_last_offset {
                    tracing::debug!(
                        offset = at,
                        limit = filter.known_last_offset,
                        monitor = %filter.monitor_id,
                        "filtered read passed its last known offset"
                    );
                    self.exhausted = true;
                    return Ok(None);
                }
            }
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            let Some(entry) = codec::decode_entry(stream, self.version)? else {
                self.exhausted = true;
                return Ok(None);
            };
            match filter {
                None => {
                    self.current_offset = at;
                    self.current_depth = entry.depth();
                    return Ok(Some(entry));
                }
                Some(filter) => {
                    if let StreamEntry::Multicast(multicast) = entry {
                        if multicast.monitor_id == filter.monitor_id {
                            self.current_offset = at;
                            self.current_depth = Some(multicast.depth);
                            return Ok(Some(StreamEntry::Unicast(multicast.entry)));
                        }
                    }
                }
            }
        }
    }

    /// Skips forward to the given logical offset by reading and
    /// discarding bytes. Works on compressed streams too.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::BackwardSeek`] if the offset was already
    /// passed and [`FormatError::Truncated`] if the stream ends first.
    pub fn skip_to(&mut self, offset: u64) -> Result<()> {
        self.pending = None;
        let at = self.raw_position();
        if offset < at {
            return Err(FormatError::BackwardSeek {
                at,
                requested: offset,
            });
        }
        let skip = offset - at;
        if skip > 0 {
            let Some(stream) = self.stream.as_mut() else {
                return Err(FormatError::Truncated("seek target"));
            };
            let copied = std::io::copy(&mut stream.by_ref().take(skip), &mut std::io::sink())?;
            if copied < skip {
                self.exhausted = true;
                return Err(FormatError::Truncated("seek target"));
            }
        }
        Ok(())
    }

    /// Advances until the next entry's timestamp is at or after `time`.
    ///
    /// On success the boundary entry is *not* consumed: the next call to
    /// [`LogReader::next_entry`] returns it. Returns `false` when the
    /// stream exhausts first.
    ///
    /// # Errors
    ///
    /// Returns an error on any structural decoding problem.
    pub fn forward_to_time(&mut self, time: LogTime) -> Result<bool> {
        while let Some(entry) = self.next_entry()? {
            if entry.time() >= time {
                self.pending = Some(Pending {
                    offset: self.current_offset,
                    depth: self.current_depth,
                    entry,
                });
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Replays every plain entry into one destination sink, in order.
    ///
    /// Multicast entries are silently skipped. With a monitor filter
    /// active the surfaced (down-cast) entries are fed instead, which
    /// reconstructs that single monitor's timeline.
    ///
    /// Returns the number of entries fed to the sink.
    ///
    /// # Errors
    ///
    /// Returns an error on any structural decoding problem.
    pub fn replay_unicast(&mut self, sink: &mut dyn ReplaySink) -> Result<u64> {
        let mut fed = 0;
        while let Some(entry) = self.next_entry()? {
            if let StreamEntry::Unicast(entry) = entry {
                Self::feed(sink, &entry);
                fed += 1;
            }
        }
        Ok(fed)
    }

    /// Replays every multicast entry into a per-monitor sink resolved by
    /// the caller. Plain entries are skipped, as are entries for which
    /// the resolver returns `None`.
    ///
    /// Returns the number of entries fed to sinks. Expects an unfiltered
    /// reader; with a filter active every surfaced entry is plain and
    /// nothing is fed.
    ///
    /// # Errors
    ///
    /// Returns an error on any structural decoding problem.
    pub fn replay_multicast(&mut self, resolver: &mut dyn SinkResolver) -> Result<u64> {
        let mut fed = 0;
        while let Some(entry) = self.next_entry()? {
            if let StreamEntry::Multicast(multicast) = entry {
                if let Some(sink) = resolver.resolve(multicast.monitor_id, multicast.depth) {
                    Self::feed(sink, &multicast.entry);
                    fed += 1;
                }
            }
        }
        Ok(fed)
    }

    /// Releases the underlying stream. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.stream = None;
        self.exhausted = true;
        self.pending = None;
    }

    fn assemble(stream: Box<dyn Read>, version: u32, base: u64, compressed: bool) -> Self {
        Self {
            stream: Some(CountingReader {
                inner: stream,
                count: 0,
            }),
            version,
            base,
            current_offset: base,
            current_depth: None,
            exhausted: false,
            filter: None,
            pending: None,
            compressed,
        }
    }

    fn raw_position(&self) -> u64 {
        self.base + self.stream.as_ref().map_or(0, |stream| stream.count)
    }

    fn feed(sink: &mut dyn ReplaySink, entry: &LogEntry) {
        match entry {
            LogEntry::Line(data) => sink.append_line(data),
            LogEntry::OpenGroup(data) => sink.open_group(data),
            LogEntry::CloseGroup(close) => sink.close_group(close.time, &close.conclusions),
        }
    }
}
