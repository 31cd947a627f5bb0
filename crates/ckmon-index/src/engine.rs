//! The concurrent multi-file engine.
//!
//! This module provides:
//! - [`MultiLogReader`] — Thread-safe registry of files and monitors
//! - [`ActivityMap`] — An immutable, point-in-time activity snapshot
//!
//! Files flow one way: a registered path is scanned once, its per-file
//! statistics feed the per-monitor live index, and snapshots read the
//! result. Registration relies on concurrent maps, so ordinary additions
//! never take a global lock; only snapshot construction serializes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use uuid::Uuid;

use ckmon_format::LogTime;

use crate::file::IndexedFile;
use crate::monitor::{LiveMonitor, MonitorSummary};

#[derive(Debug, Clone, Copy, Default)]
struct Bounds {
    first: Option<LogTime>,
    last: Option<LogTime>,
}

/// An immutable, point-in-time summary of all indexed files and all
/// known monitors' aggregated activity.
#[derive(Clone)]
pub struct ActivityMap {
    /// Every registered file, including ones whose scan failed.
    pub files: Vec<Arc<IndexedFile>>,
    /// Files that scanned cleanly and hold at least one entry.
    pub valid_files: Vec<Arc<IndexedFile>>,
    /// Every known monitor, sorted by id.
    pub monitors: Vec<MonitorSummary>,
    /// Timestamp of the earliest entry across all files.
    pub first_time: Option<LogTime>,
    /// Timestamp of the latest entry across all files.
    pub last_time: Option<LogTime>,
}

/// Ingests many log files into a queryable activity index.
///
/// Thread-safe: files may be added concurrently from many threads while
/// snapshots are taken. A path is scanned exactly once; re-adding it
/// returns the existing file object without re-scanning, since indexed
/// files are assumed immutable.
#[derive(Default)]
pub struct MultiLogReader {
    files: DashMap<PathBuf, Arc<IndexedFile>>,
    monitors: DashMap<Uuid, Arc<LiveMonitor>>,
    bounds: Mutex<Bounds>,
    snapshot: RwLock<()>,
}

impl MultiLogReader {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a log file, scanning it if it is new.
    ///
    /// The returned file's statistics are already initialized; check
    /// [`IndexedFile::stats`] for a scan error before trusting counts.
    /// Re-adding a known path returns the existing object.
    pub fn add_file(&self, path: impl AsRef<Path>) -> Arc<IndexedFile> {
        self.add_file_inner(path.as_ref()).0
    }

    /// Registers many log files, scanning them in parallel.
    ///
    /// Returns only the files newly indexed by this call; already-known
    /// paths stay registered but are omitted from the result.
    pub fn add_files<I, P>(&self, paths: I) -> Vec<Arc<IndexedFile>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<PathBuf> = paths
            .into_iter()
            .map(|path| path.as_ref().to_path_buf())
            .collect();
        paths
            .par_iter()
            .filter_map(|path| {
                let (file, inserted) = self.add_file_inner(path);
                inserted.then_some(file)
            })
            .collect()
    }

    /// Returns the registered file for a path, if any.
    #[must_use]
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Arc<IndexedFile>> {
        self.files.get(&normalize(path.as_ref())).map(|entry| entry.value().clone())
    }

    /// Returns the live index for a monitor, if it has been sighted.
    #[must_use]
    pub fn monitor(&self, monitor_id: Uuid) -> Option<Arc<LiveMonitor>> {
        self.monitors.get(&monitor_id).map(|entry| entry.value().clone())
    }

    /// Returns the number of registered files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Returns the number of known monitors.
    #[must_use]
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Takes a consistent snapshot of all files and monitors.
    ///
    /// Snapshot construction holds a write lock so a monitor's
    /// occurrence list is never observed mid-mutation while files are
    /// being registered on other threads.
    #[must_use]
    pub fn activity_map(&self) -> ActivityMap {
        let _guard = self.snapshot.write();

        let mut files: Vec<Arc<IndexedFile>> = self
            .files
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        files.sort_by(|a, b| a.path().cmp(b.path()));
        let valid_files = files.iter().filter(|file| file.is_valid()).cloned().collect();

        let mut monitors: Vec<MonitorSummary> = self
            .monitors
            .iter()
            .map(|entry| entry.value().summary())
            .collect();
        monitors.sort_by_key(|summary| summary.monitor_id);

        let bounds = *self.bounds.lock();
        tracing::debug!(
            files = files.len(),
            monitors = monitors.len(),
            "activity map snapshot taken"
        );
        ActivityMap {
            files,
            valid_files,
            monitors,
            first_time: bounds.first,
            last_time: bounds.last,
        }
    }

    fn add_file_inner(&self, path: &Path) -> (Arc<IndexedFile>, bool) {
        let key = normalize(path);
        let (file, inserted) = match self.files.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(slot) => (slot.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let file = Arc::new(IndexedFile::new(key));
                slot.insert(file.clone());
                (file, true)
            }
        };

        // Scanning happens outside the map guard; concurrent adds of the
        // same path block here until the single scan completes.
        let stats = file.initialize();

        if inserted {
            for occurrence in &stats.occurrences {
                let monitor = self
                    .monitors
                    .entry(occurrence.monitor_id)
                    .or_insert_with(|| Arc::new(LiveMonitor::new(occurrence.monitor_id)))
                    .clone();
                monitor.register(occurrence.clone());
            }
            if stats.first_time.is_some() || stats.last_time.is_some() {
                let mut bounds = self.bounds.lock();
                if let Some(first) = stats.first_time {
                    if bounds.first.is_none_or(|current| first < current) {
                        bounds.first = Some(first);
                    }
                }
                if let Some(last) = stats.last_time {
                    if bounds.last.is_none_or(|current| last > current) {
                        bounds.last = Some(last);
                    }
                }
            }
            tracing::debug!(
                path = %file.path().display(),
                entries = stats.total_count,
                occurrences = stats.occurrences.len(),
                error = stats.error.as_deref().unwrap_or(""),
                "indexed log file"
            );
        }
        (file, inserted)
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
