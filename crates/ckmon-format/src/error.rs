//! Error types for the ckmon wire format.

use thiserror::Error;

/// Errors that can occur while reading or writing ckmon streams.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The stream does not start with a recognizable header.
    #[error("invalid stream header")]
    InvalidHeader,

    /// The stream declares a version this crate cannot read.
    #[error("unsupported stream version: {0}")]
    UnsupportedVersion(u32),

    /// The entry flags byte does not name a known entry kind.
    #[error("invalid entry kind: 0x{0:02x}")]
    InvalidEntryKind(u8),

    /// The entry flags byte combines bits that cannot occur together.
    #[error("inconsistent entry flags: 0x{0:02x}")]
    InconsistentFlags(u8),

    /// The level byte does not name a known severity.
    #[error("invalid level byte: 0x{0:02x}")]
    InvalidLevel(u8),

    /// A string payload is not valid UTF-8.
    #[error("invalid UTF-8 in {context}")]
    InvalidText {
        /// What was being decoded when the bad bytes were found.
        context: &'static str,
        /// The underlying conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// A string length prefix exceeds the sanity limit.
    #[error("string length {0} exceeds the size limit")]
    StringTooLong(u32),

    /// An exception payload nests deeper than the decoder allows.
    #[error("exception payload nests too deep")]
    ExceptionTooDeep,

    /// The stream ended in the middle of an entry.
    #[error("truncated stream while reading {0}")]
    Truncated(&'static str),

    /// A seek requested a position the reader has already passed.
    #[error("cannot seek backward (at {at}, requested {requested})")]
    BackwardSeek {
        /// Current logical stream offset.
        at: u64,
        /// The requested (earlier) offset.
        requested: u64,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for wire format operations.
pub type Result<T> = std::result::Result<T, FormatError>;
