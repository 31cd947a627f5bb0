//! Error types for the indexing engine.

use thiserror::Error;

use ckmon_format::FormatError;

/// Errors that can occur while indexing or re-reading log files.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A wire-format error from the underlying stream.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for indexing operations.
pub type Result<T> = std::result::Result<T, IndexError>;
