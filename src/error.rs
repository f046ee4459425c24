//! Error types for SkipKV
//!
//! Provides a unified error type for all operations.
//!
//! Expected outcomes are not errors: a lookup miss is `None` and a Bloom
//! filter false positive is just `true`.

use thiserror::Error;

/// Result type alias using SkipKvError
pub type Result<T> = std::result::Result<T, SkipKvError>;

/// Unified error type for SkipKV operations
#[derive(Debug, Error)]
pub enum SkipKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Flush Errors
    // -------------------------------------------------------------------------
    /// Writing segment `segment_id` failed. The in-memory index is untouched
    /// and the flush can be retried.
    #[error("Flush of segment {segment_id} failed: {source}")]
    FlushFailed {
        segment_id: u64,
        #[source]
        source: Box<SkipKvError>,
    },

    #[error("MemTable is frozen")]
    Frozen,

    // -------------------------------------------------------------------------
    // Segment Metadata Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Segment corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for SkipKvError {
    fn from(err: bincode::Error) -> Self {
        SkipKvError::Serialization(err.to_string())
    }
}
