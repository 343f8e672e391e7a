//! Error types for segkv
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for segkv operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    /// Key absent from every segment. Expected, not a failure.
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Segment Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record in {} at offset {offset}: {reason}", path.display())]
    CorruptRecord {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("Invalid segment file name: {0}")]
    InvalidSegmentName(String),

    #[error("Segment {} is sealed", .0.display())]
    SegmentSealed(PathBuf),

    #[error("Record field too large: {len} bytes (max {})", u32::MAX)]
    RecordTooLarge { len: usize },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Engine is already closed")]
    AlreadyClosed,

    #[error("Write serializer unavailable: {0}")]
    WriterUnavailable(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// True for the expected "key absent" outcome.
    ///
    /// Lets a front door map lookups to 404 without matching on the enum.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound)
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, offset: u64, reason: impl Into<String>) -> Self {
        KvError::CorruptRecord {
            path: path.into(),
            offset,
            reason: reason.into(),
        }
    }
}
