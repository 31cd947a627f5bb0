//! Per-monitor cross-file aggregation.
//!
//! This module provides:
//! - [`LiveMonitor`] — A monitor's occurrences and global time bounds,
//!   extended as files are indexed
//! - [`MonitorSummary`] — An immutable snapshot of a monitor's activity
//!
//! A monitor that was rotated across many files keeps one occurrence per
//! file; widening the global first/last bounds here is what tracks the
//! monitor's continuity without re-reading any file.

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use ckmon_format::LogTime;

use crate::file::MonitorOccurrence;

#[derive(Default)]
struct Aggregate {
    occurrences: Vec<MonitorOccurrence>,
    first: Option<(LogTime, i32)>,
    last: Option<(LogTime, i32)>,
}

/// A monitor's activity aggregated across every file it appears in.
///
/// Occurrences are appended in registration order under a per-monitor
/// lock; a monitor is never removed once created.
pub struct LiveMonitor {
    monitor_id: Uuid,
    inner: Mutex<Aggregate>,
}

impl LiveMonitor {
    pub(crate) fn new(monitor_id: Uuid) -> Self {
        Self {
            monitor_id,
            inner: Mutex::new(Aggregate::default()),
        }
    }

    /// Returns the monitor's identifier.
    #[must_use]
    pub const fn monitor_id(&self) -> Uuid {
        self.monitor_id
    }

    /// Registers a newly discovered occurrence, widening the global
    /// first/last time and depth.
    pub(crate) fn register(&self, occurrence: MonitorOccurrence) {
        let mut aggregate = self.inner.lock();
        if aggregate
            .first
            .is_none_or(|(time, _)| occurrence.first_time < time)
        {
            aggregate.first = Some((occurrence.first_time, occurrence.first_depth));
        }
        if aggregate
            .last
            .is_none_or(|(time, _)| occurrence.last_time > time)
        {
            aggregate.last = Some((occurrence.last_time, occurrence.last_depth));
        }
        aggregate.occurrences.push(occurrence);
    }

    /// Returns the number of files this monitor appears in.
    #[must_use]
    pub fn occurrence_count(&self) -> usize {
        self.inner.lock().occurrences.len()
    }

    /// Takes an immutable snapshot of the monitor's activity.
    #[must_use]
    pub fn summary(&self) -> MonitorSummary {
        let aggregate = self.inner.lock();
        MonitorSummary {
            monitor_id: self.monitor_id,
            occurrences: aggregate.occurrences.clone(),
            first_time: aggregate.first.map(|(time, _)| time),
            first_depth: aggregate.first.map(|(_, depth)| depth),
            last_time: aggregate.last.map(|(time, _)| time),
            last_depth: aggregate.last.map(|(_, depth)| depth),
        }
    }
}

/// An immutable snapshot of one monitor's aggregated activity.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSummary {
    /// The monitor's identifier.
    pub monitor_id: Uuid,
    /// The monitor's occurrences, in registration order.
    pub occurrences: Vec<MonitorOccurrence>,
    /// Timestamp of the monitor's earliest entry across all files.
    pub first_time: Option<LogTime>,
    /// Nesting depth at the earliest entry.
    pub first_depth: Option<i32>,
    /// Timestamp of the monitor's latest entry across all files.
    pub last_time: Option<LogTime>,
    /// Nesting depth at the latest entry.
    pub last_depth: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn at(nanos: i64) -> LogTime {
        LogTime::from_ticks(nanos, 0)
    }

    fn occurrence(name: &str, monitor_id: Uuid, first: i64, last: i64) -> MonitorOccurrence {
        MonitorOccurrence {
            path: PathBuf::from(name),
            version: 6,
            monitor_id,
            first_offset: 9,
            last_offset: 90,
            first_time: at(first),
            last_time: at(last),
            first_depth: 0,
            last_depth: 2,
        }
    }

    #[test]
    fn register_appends_in_order() {
        let id = Uuid::new_v4();
        let monitor = LiveMonitor::new(id);
        monitor.register(occurrence("b.ckmon", id, 5_000, 6_000));
        monitor.register(occurrence("a.ckmon", id, 1_000, 2_000));

        let summary = monitor.summary();
        assert_eq!(summary.occurrences.len(), 2);
        assert_eq!(summary.occurrences[0].path, PathBuf::from("b.ckmon"));
        assert_eq!(summary.occurrences[1].path, PathBuf::from("a.ckmon"));
    }

    #[test]
    fn register_widens_global_bounds() {
        let id = Uuid::new_v4();
        let monitor = LiveMonitor::new(id);
        monitor.register(occurrence("mid.ckmon", id, 3_000, 4_000));
        monitor.register(occurrence("late.ckmon", id, 5_000, 6_000));
        monitor.register(occurrence("early.ckmon", id, 1_000, 2_000));

        let summary = monitor.summary();
        assert_eq!(summary.first_time, Some(at(1_000)));
        assert_eq!(summary.last_time, Some(at(6_000)));
        assert_eq!(summary.first_depth, Some(0));
        assert_eq!(summary.last_depth, Some(2));
    }

    #[test]
    fn empty_monitor_has_no_bounds() {
        let monitor = LiveMonitor::new(Uuid::new_v4());
        let summary = monitor.summary();
        assert!(summary.occurrences.is_empty());
        assert_eq!(summary.first_time, None);
        assert_eq!(summary.last_time, None);
        assert_eq!(monitor.occurrence_count(), 0);
    }
}
