//! In-memory representation of log entries.
//!
//! This module provides:
//! - [`LogEntry`] — A line, an opened group, or a closed group
//! - [`EntryData`] — The shared payload of lines and opened groups
//! - [`ExceptionData`] — A recursive, eagerly captured exception dump
//! - [`MulticastEntry`] — An entry tagged with its producing monitor
//! - [`StreamEntry`] — What a stream actually yields: plain or multicast
//!
//! Entries are transient values: constructed by a producer, encoded,
//! decoded and replayed, never mutated in place.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::level::Level;
use crate::tags::TagSet;
use crate::time::LogTime;

/// Captured exception information, including nested causes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionData {
    /// The exception message.
    pub message: String,
    /// The exception's type name.
    pub type_name: String,
    /// The captured stack trace, if any.
    pub stack_trace: Option<String>,
    /// The direct cause, if any.
    pub inner: Option<Box<ExceptionData>>,
    /// Sibling exceptions aggregated under this one.
    pub aggregated: Vec<ExceptionData>,
}

impl ExceptionData {
    /// Creates exception data with a type name and message.
    #[must_use]
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            type_name: type_name.into(),
            stack_trace: None,
            inner: None,
            aggregated: Vec::new(),
        }
    }

    /// Attaches a stack trace.
    #[must_use]
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Attaches a direct cause.
    #[must_use]
    pub fn with_inner(mut self, inner: ExceptionData) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Appends an aggregated sibling exception.
    #[must_use]
    pub fn with_aggregated(mut self, aggregated: ExceptionData) -> Self {
        self.aggregated.push(aggregated);
        self
    }
}

/// A source-code location attached to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// The source file name.
    pub file: String,
    /// The line number within the file.
    pub line: u32,
}

/// The payload shared by lines and opened groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryData {
    /// Severity of the entry.
    pub level: Level,
    /// Whether the entry passed a live filter when captured.
    pub filtered: bool,
    /// When the entry was emitted.
    pub time: LogTime,
    /// The entry text.
    pub text: String,
    /// Tags attached to the entry.
    pub tags: TagSet,
    /// Captured exception, if any.
    pub exception: Option<ExceptionData>,
    /// Source location, if captured.
    pub source: Option<SourceRef>,
}

impl EntryData {
    /// Creates entry data with the required fields.
    #[must_use]
    pub fn new(level: Level, time: LogTime, text: impl Into<String>) -> Self {
        Self {
            level,
            filtered: false,
            time,
            text: text.into(),
            tags: TagSet::empty(),
            exception: None,
            source: None,
        }
    }

    /// Sets the tag set.
    #[must_use]
    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// Attaches a captured exception.
    #[must_use]
    pub fn with_exception(mut self, exception: ExceptionData) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Attaches a source location.
    #[must_use]
    pub fn with_source(mut self, file: impl Into<String>, line: u32) -> Self {
        self.source = Some(SourceRef {
            file: file.into(),
            line,
        });
        self
    }

    /// Marks the entry as having passed a live filter.
    #[must_use]
    pub const fn with_filtered(mut self, filtered: bool) -> Self {
        self.filtered = filtered;
        self
    }
}

/// One conclusion recorded when a group closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConclusion {
    /// Tag identifying who produced the conclusion.
    pub tag: TagSet,
    /// The conclusion text.
    pub text: String,
}

impl GroupConclusion {
    /// Creates a conclusion.
    #[must_use]
    pub fn new(tag: TagSet, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
        }
    }
}

/// The payload of a closed group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseData {
    /// Severity the group was opened with.
    pub level: Level,
    /// Whether the group passed a live filter when captured.
    pub filtered: bool,
    /// When the group closed.
    pub time: LogTime,
    /// Conclusions recorded at close, in order.
    pub conclusions: Vec<GroupConclusion>,
}

/// A single activity-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A plain log line.
    Line(EntryData),
    /// The opening of a nested group.
    OpenGroup(EntryData),
    /// The closing of a nested group, with its conclusions.
    CloseGroup(CloseData),
}

impl LogEntry {
    /// Returns the entry's timestamp.
    #[must_use]
    pub fn time(&self) -> LogTime {
        match self {
            Self::Line(data) | Self::OpenGroup(data) => data.time,
            Self::CloseGroup(close) => close.time,
        }
    }

    /// Returns the entry's severity.
    #[must_use]
    pub fn level(&self) -> Level {
        match self {
            Self::Line(data) | Self::OpenGroup(data) => data.level,
            Self::CloseGroup(close) => close.level,
        }
    }

    /// Returns whether the entry passed a live filter when captured.
    #[must_use]
    pub fn filtered(&self) -> bool {
        match self {
            Self::Line(data) | Self::OpenGroup(data) => data.filtered,
            Self::CloseGroup(close) => close.filtered,
        }
    }

    /// Returns the line/open-group payload, if this is not a close.
    #[must_use]
    pub fn data(&self) -> Option<&EntryData> {
        match self {
            Self::Line(data) | Self::OpenGroup(data) => Some(data),
            Self::CloseGroup(_) => None,
        }
    }

    /// Returns a copy of this entry carrying the given timestamp.
    #[must_use]
    pub fn with_time(mut self, time: LogTime) -> Self {
        match &mut self {
            Self::Line(data) | Self::OpenGroup(data) => data.time = time,
            Self::CloseGroup(close) => close.time = time,
        }
        self
    }
}

/// An entry tagged with the identity and nesting depth of its producer.
///
/// Only multi-producer streams carry these; the depth lets a reader
/// reconstruct nesting without replaying the whole tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastEntry {
    /// The producing monitor's identifier.
    pub monitor_id: Uuid,
    /// The producer's group nesting depth when the entry was emitted.
    pub depth: i32,
    /// The wrapped entry.
    pub entry: LogEntry,
}

/// One decoded element of a ckmon stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEntry {
    /// A plain, single-producer entry.
    Unicast(LogEntry),
    /// An entry from a multi-producer stream.
    Multicast(MulticastEntry),
}

impl StreamEntry {
    /// Returns the wrapped entry.
    #[must_use]
    pub fn entry(&self) -> &LogEntry {
        match self {
            Self::Unicast(entry) => entry,
            Self::Multicast(multicast) => &multicast.entry,
        }
    }

    /// Consumes the stream entry, returning the wrapped entry.
    #[must_use]
    pub fn into_entry(self) -> LogEntry {
        match self {
            Self::Unicast(entry) => entry,
            Self::Multicast(multicast) => multicast.entry,
        }
    }

    /// Returns the producing monitor's id for multicast entries.
    #[must_use]
    pub fn monitor_id(&self) -> Option<Uuid> {
        match self {
            Self::Unicast(_) => None,
            Self::Multicast(multicast) => Some(multicast.monitor_id),
        }
    }

    /// Returns the nesting depth for multicast entries.
    #[must_use]
    pub fn depth(&self) -> Option<i32> {
        match self {
            Self::Unicast(_) => None,
            Self::Multicast(multicast) => Some(multicast.depth),
        }
    }

    /// Returns the wrapped entry's timestamp.
    #[must_use]
    pub fn time(&self) -> LogTime {
        self.entry().time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(nanos: i64) -> LogTime {
        LogTime::from_ticks(nanos, 0)
    }

    #[test]
    fn entry_data_chain() {
        let data = EntryData::new(Level::Warn, at(10), "disk almost full")
            .with_tags(TagSet::intern("storage"))
            .with_source("store.rs", 42)
            .with_filtered(true);

        assert_eq!(data.level, Level::Warn);
        assert_eq!(data.text, "disk almost full");
        assert!(data.filtered);
        assert_eq!(data.tags.as_str(), "storage");
        assert_eq!(
            data.source,
            Some(SourceRef {
                file: "store.rs".to_string(),
                line: 42
            })
        );
    }

    #[test]
    fn exception_chain() {
        let exception = ExceptionData::new("IoError", "read failed")
            .with_stack_trace("at read()")
            .with_inner(ExceptionData::new("OsError", "EBADF"))
            .with_aggregated(ExceptionData::new("Timeout", "deadline passed"));

        assert_eq!(exception.message, "read failed");
        assert_eq!(
            exception.inner.as_deref().map(|e| e.type_name.as_str()),
            Some("OsError")
        );
        assert_eq!(exception.aggregated.len(), 1);
    }

    #[test]
    fn log_entry_accessors() {
        let line = LogEntry::Line(EntryData::new(Level::Info, at(5), "hello"));
        assert_eq!(line.level(), Level::Info);
        assert_eq!(line.time(), at(5));
        assert!(line.data().is_some());

        let close = LogEntry::CloseGroup(CloseData {
            level: Level::Debug,
            filtered: false,
            time: at(9),
            conclusions: vec![GroupConclusion::new(TagSet::empty(), "done")],
        });
        assert_eq!(close.level(), Level::Debug);
        assert!(close.data().is_none());
    }

    #[test]
    fn with_time_rewrites_every_variant() {
        let line = LogEntry::Line(EntryData::new(Level::Info, at(5), "x"));
        assert_eq!(line.with_time(at(7)).time(), at(7));

        let close = LogEntry::CloseGroup(CloseData {
            level: Level::Info,
            filtered: false,
            time: at(5),
            conclusions: Vec::new(),
        });
        assert_eq!(close.with_time(at(7)).time(), at(7));
    }

    #[test]
    fn stream_entry_accessors() {
        let plain = StreamEntry::Unicast(LogEntry::Line(EntryData::new(
            Level::Info,
            at(1),
            "plain",
        )));
        assert_eq!(plain.monitor_id(), None);
        assert_eq!(plain.depth(), None);

        let id = Uuid::new_v4();
        let multicast = StreamEntry::Multicast(MulticastEntry {
            monitor_id: id,
            depth: 3,
            entry: LogEntry::Line(EntryData::new(Level::Info, at(2), "tagged")),
        });
        assert_eq!(multicast.monitor_id(), Some(id));
        assert_eq!(multicast.depth(), Some(3));
        assert_eq!(multicast.time(), at(2));
    }
}
