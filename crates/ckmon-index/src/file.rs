//! Per-file indexing.
//!
//! This module provides:
//! - [`IndexedFile`] — Per-file statistics computed by one full scan
//! - [`FileStats`] — The accumulated counts, time bounds and occurrences
//! - [`MonitorOccurrence`] — One monitor's contiguous span within a file
//! - [`LevelCounts`] — Per-severity entry counts
//!
//! A file is scanned exactly once: concurrent initializers collapse into
//! a single scan, and the statistics are immutable afterwards. A failed
//! scan records its error on the file instead of propagating, so one
//! corrupt file cannot poison a multi-file index.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ckmon_format::{FormatError, Level, LogReader, LogTime, StreamEntry};

use crate::error::{IndexError, Result};

/// Per-severity entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCounts([u64; 6]);

impl LevelCounts {
    /// Increments the count for a level.
    pub fn bump(&mut self, level: Level) {
        self.0[level.index()] += 1;
    }

    /// Returns the count for a level.
    #[must_use]
    pub const fn get(&self, level: Level) -> u64 {
        self.0[level.index()]
    }

    /// Returns the sum over all levels.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

/// The contiguous span during which one monitor's entries appear within
/// one file.
///
/// A monitor has at most one occurrence per file; `first_offset` is
/// fixed when the monitor is first sighted and the `last_*` fields widen
/// on every later sighting during the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorOccurrence {
    /// The file the occurrence was found in.
    pub path: PathBuf,
    /// The file's stream version.
    pub version: u32,
    /// The monitor whose entries this span covers.
    pub monitor_id: Uuid,
    /// Offset of the monitor's first entry in the file.
    pub first_offset: u64,
    /// Offset of the monitor's last entry in the file.
    pub last_offset: u64,
    /// Timestamp of the monitor's first entry in the file.
    pub first_time: LogTime,
    /// Timestamp of the monitor's last entry in the file.
    pub last_time: LogTime,
    /// Nesting depth at the monitor's first entry.
    pub first_depth: i32,
    /// Nesting depth at the monitor's last entry.
    pub last_depth: i32,
}

impl MonitorOccurrence {
    /// Opens a filtered reader over this occurrence, positioned at its
    /// first entry and bounded by its last offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be reopened or positioned.
    pub fn open_reader(&self) -> Result<LogReader> {
        self.open_reader_from(self.first_offset)
    }

    /// Opens a filtered reader over this occurrence starting at the
    /// given offset (clamped to the occurrence's first offset).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be reopened or positioned.
    pub fn open_reader_from(&self, offset: u64) -> Result<LogReader> {
        let file = File::open(&self.path)?;
        let mut reader = LogReader::from_stream(BufReader::new(file))?
            .with_filter(self.monitor_id, self.last_offset);
        reader.skip_to(offset.max(self.first_offset))?;
        Ok(reader)
    }

    /// Opens a filtered reader fast-forwarded to the first of this
    /// monitor's entries at or after the given timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be reopened or positioned.
    pub fn open_reader_at(&self, time: LogTime) -> Result<LogReader> {
        let mut reader = self.open_reader()?;
        reader.forward_to_time(time).map_err(IndexError::from)?;
        Ok(reader)
    }
}

/// Statistics accumulated by one full scan of a log file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileStats {
    /// The file's stream version.
    pub version: u32,
    /// Total number of entries, multicast or not.
    pub total_count: u64,
    /// Entries whose captured level carried the filter-approved bit.
    pub unfiltered_count: u64,
    /// Per-severity counts.
    pub level_counts: LevelCounts,
    /// Timestamp of the earliest entry.
    pub first_time: Option<LogTime>,
    /// Timestamp of the latest entry.
    pub last_time: Option<LogTime>,
    /// One span per distinct monitor sighted in the file.
    pub occurrences: Vec<MonitorOccurrence>,
    /// Set instead of trustworthy statistics when the scan failed.
    pub error: Option<String>,
}

/// A log file registered with the indexing engine.
///
/// Statistics are computed lazily by [`IndexedFile::initialize`] and are
/// immutable once computed; concurrent initializers collapse into one
/// scan.
#[derive(Debug)]
pub struct IndexedFile {
    path: PathBuf,
    stats: OnceCell<FileStats>,
    scan_count: AtomicU64,
}

impl IndexedFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            stats: OnceCell::new(),
            scan_count: AtomicU64::new(0),
        }
    }

    /// Returns the file's normalized path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Computes the file's statistics, scanning at most once.
    ///
    /// Concurrent callers block until the single scan completes. A scan
    /// failure is recorded in [`FileStats::error`] with whatever partial
    /// statistics had accumulated.
    pub fn initialize(&self) -> &FileStats {
        self.stats.get_or_init(|| {
            self.scan_count.fetch_add(1, Ordering::Relaxed);
            scan_file(&self.path)
        })
    }

    /// Returns the statistics if the file has been scanned.
    #[must_use]
    pub fn stats(&self) -> Option<&FileStats> {
        self.stats.get()
    }

    /// Returns true if the file scanned cleanly and holds entries.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.stats
            .get()
            .is_some_and(|stats| stats.error.is_none() && stats.total_count > 0)
    }

    /// Returns how many scans have run (at most one, absent bugs).
    #[must_use]
    pub fn scan_count(&self) -> u64 {
        self.scan_count.load(Ordering::Relaxed)
    }
}

fn scan_file(path: &Path) -> FileStats {
    tracing::debug!(path = %path.display(), "scanning log file");
    let mut stats = FileStats::default();
    if let Err(err) = scan_into(path, &mut stats) {
        tracing::warn!(path = %path.display(), error = %err, "log file scan failed");
        stats.error = Some(err.to_string());
    }
    stats
}

fn scan_into(path: &Path, stats: &mut FileStats) -> std::result::Result<(), FormatError> {
    let mut reader = LogReader::open(path)?;
    stats.version = reader.version();

    let mut seen: HashMap<Uuid, usize> = HashMap::new();
    while let Some(entry) = reader.next_entry()? {
        let offset = reader.current_offset();
        let time = entry.time();
        let inner = entry.entry();

        stats.total_count += 1;
        stats.level_counts.bump(inner.level());
        if inner.filtered() {
            stats.unfiltered_count += 1;
        }
        if stats.first_time.is_none_or(|first| time < first) {
            stats.first_time = Some(time);
        }
        if stats.last_time.is_none_or(|last| time > last) {
            stats.last_time = Some(time);
        }

        if let StreamEntry::Multicast(multicast) = &entry {
            match seen.entry(multicast.monitor_id) {
                Entry::Occupied(slot) => {
                    let occurrence = &mut stats.occurrences[*slot.get()];
                    occurrence.last_offset = offset;
                    occurrence.last_time = time;
                    occurrence.last_depth = multicast.depth;
                }
                Entry::Vacant(slot) => {
                    slot.insert(stats.occurrences.len());
                    stats.occurrences.push(MonitorOccurrence {
                        path: path.to_path_buf(),
                        version: stats.version,
                        monitor_id: multicast.monitor_id,
                        first_offset: offset,
                        last_offset: offset,
                        first_time: time,
                        last_time: time,
                        first_depth: multicast.depth,
                        last_depth: multicast.depth,
                    });
                }
            }
        }
    }
    Ok(())
}
