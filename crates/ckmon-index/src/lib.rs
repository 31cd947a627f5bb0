//! # ckmon-index
//!
//! Concurrent multi-file indexing and activity maps for ckmon logs.
//!
//! This crate provides:
//!
//! - [`MultiLogReader`] — Thread-safe registry ingesting many log files
//! - [`IndexedFile`] / [`FileStats`] — Per-file scan-once statistics
//! - [`MonitorOccurrence`] — One monitor's span within one file, with
//!   bounded filtered-reader factories
//! - [`LiveMonitor`] / [`MonitorSummary`] — Cross-file aggregation
//! - [`ActivityMap`] — Immutable point-in-time snapshots
//!
//! ## Example
//!
//! ```rust
//! use ckmon_format::{Level, LogWriter, TagSet};
//! use ckmon_index::MultiLogReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("app.ckmon");
//! let mut writer = LogWriter::create(&path)?;
//! writer.line(Level::Info, TagSet::empty(), "ready")?;
//! writer.close()?;
//!
//! let engine = MultiLogReader::new();
//! let file = engine.add_file(&path);
//! assert!(file.is_valid());
//!
//! let map = engine.activity_map();
//! assert_eq!(map.valid_files.len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod file;
pub mod monitor;

// Re-export main types
pub use engine::{ActivityMap, MultiLogReader};
pub use error::{IndexError, Result};
pub use file::{FileStats, IndexedFile, LevelCounts, MonitorOccurrence};
pub use monitor::{LiveMonitor, MonitorSummary};
