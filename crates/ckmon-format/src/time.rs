//! Strictly ascending log timestamps.
//!
//! This module provides [`LogTime`], a UTC instant paired with a one-byte
//! uniquifier. The uniquifier breaks ties when the clock resolution is
//! insufficient (or the clock moves backward), so a producer's timestamps
//! form a total order usable as a deduplication key.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A log timestamp: a UTC instant plus a tie-breaking uniquifier.
///
/// Ordering is lexicographic on `(instant, uniquifier)`. The all-zero tick
/// value is the "undefined" timestamp.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LogTime {
    instant: DateTime<Utc>,
    uniquifier: u8,
}

impl LogTime {
    /// Creates a timestamp for the given instant with a zero uniquifier.
    #[must_use]
    pub const fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            uniquifier: 0,
        }
    }

    /// Creates a timestamp with an explicit uniquifier.
    #[must_use]
    pub const fn with_uniquifier(instant: DateTime<Utc>, uniquifier: u8) -> Self {
        Self {
            instant,
            uniquifier,
        }
    }

    /// The undefined timestamp (zero tick value).
    #[must_use]
    pub fn undefined() -> Self {
        Self::from_ticks(0, 0)
    }

    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Rebuilds a timestamp from its wire tick value and uniquifier.
    ///
    /// Ticks are nanoseconds since the Unix epoch.
    #[must_use]
    pub fn from_ticks(ticks: i64, uniquifier: u8) -> Self {
        Self {
            instant: DateTime::from_timestamp_nanos(ticks),
            uniquifier,
        }
    }

    /// Returns the wire tick value for this timestamp.
    ///
    /// Instants outside the nanosecond-representable range encode as the
    /// undefined tick value.
    #[must_use]
    pub fn ticks(&self) -> i64 {
        self.instant.timestamp_nanos_opt().unwrap_or(0)
    }

    /// Returns the UTC instant.
    #[must_use]
    pub const fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    /// Returns the tie-breaking uniquifier.
    #[must_use]
    pub const fn uniquifier(&self) -> u8 {
        self.uniquifier
    }

    /// Returns true if this timestamp holds a real instant.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.ticks() != 0
    }

    /// Builds the next timestamp after `prev` for a candidate instant,
    /// guaranteeing strict ascension.
    ///
    /// If the candidate is strictly greater than `prev`'s instant it is
    /// taken as-is with a fresh uniquifier. Otherwise `prev`'s uniquifier
    /// is incremented; when it would pass 255 the instant advances by one
    /// tick and the uniquifier resets to 1.
    #[must_use]
    pub fn next(prev: Self, candidate: DateTime<Utc>) -> Self {
        if candidate > prev.instant {
            Self::new(candidate)
        } else if prev.uniquifier < u8::MAX {
            Self {
                instant: prev.instant,
                uniquifier: prev.uniquifier + 1,
            }
        } else {
            Self {
                instant: prev.instant + TimeDelta::nanoseconds(1),
                uniquifier: 1,
            }
        }
    }
}

impl fmt::Display for LogTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uniquifier == 0 {
            write!(f, "{}", self.instant.to_rfc3339())
        } else {
            write!(f, "{}({})", self.instant.to_rfc3339(), self.uniquifier)
        }
    }
}
