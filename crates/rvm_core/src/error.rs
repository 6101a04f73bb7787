//! Error types for RVM core.

use crate::types::TransactionId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type RvmResult<T> = Result<T, RvmError>;

/// Errors that can occur in RVM operations.
#[derive(Debug, Error)]
pub enum RvmError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] rvm_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The RVM path exists but is not a directory.
    #[error("path exists and is not a directory: {}", path.display())]
    DirectoryConflict {
        /// The offending path.
        path: PathBuf,
    },

    /// The RVM directory does not exist and creation was disabled.
    #[error("RVM directory does not exist: {}", path.display())]
    DirectoryMissing {
        /// The missing path.
        path: PathBuf,
    },

    /// Another instance holds the directory lock.
    #[error("RVM directory locked: another instance has exclusive access")]
    DirectoryLocked,

    /// Segment name cannot be used as a backing file name.
    #[error("invalid segment name: {name:?}")]
    InvalidSegmentName {
        /// The rejected name.
        name: String,
    },

    /// Segment is already mapped in this instance.
    #[error("segment already mapped: {name}")]
    SegmentAlreadyMapped {
        /// Name of the segment.
        name: String,
    },

    /// Handle does not resolve to a mapped segment.
    #[error("segment not found")]
    SegmentNotFound,

    /// Segment is owned by an active transaction.
    #[error("segment {name} is in use by {owner}")]
    SegmentBusy {
        /// Name of the segment.
        name: String,
        /// Transaction currently holding it.
        owner: TransactionId,
    },

    /// A segment passed to `begin_trans` is already owned.
    #[error("segment {name} already belongs to {owner}")]
    TransactionSegmentConflict {
        /// Name of the segment.
        name: String,
        /// Transaction currently holding it.
        owner: TransactionId,
    },

    /// Transaction is unknown or already committed/aborted.
    #[error("transaction not found: {tid}")]
    TransactionNotFound {
        /// The transaction ID.
        tid: TransactionId,
    },

    /// Commit of a transaction with no declared modifications in strict mode.
    #[error("{tid} declared no modifications")]
    CommitWithNoChanges {
        /// The transaction ID.
        tid: TransactionId,
    },

    /// Byte range falls outside a segment or file.
    #[error("range out of bounds: offset {offset}, len {len}, size {size}")]
    OutOfBounds {
        /// Start of the range.
        offset: u64,
        /// Length of the range.
        len: u64,
        /// Size of the target.
        size: u64,
    },

    /// The commit log is corrupted.
    #[error("commit log corruption at offset {offset}: {message}")]
    LogCorruption {
        /// Offset of the bad record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A failed commit could not be trimmed off the log.
    ///
    /// The transaction's records may be durable. The transaction is treated
    /// as committed.
    #[error("failed to trim commit log back to offset {offset}: {message}")]
    LogTrimFailed {
        /// Log length before the failed append.
        offset: u64,
        /// The append failure and the trim failure.
        message: String,
    },
}

impl RvmError {
    /// Creates a log corruption error.
    pub fn log_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::LogCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid segment name error.
    pub fn invalid_segment_name(name: impl Into<String>) -> Self {
        Self::InvalidSegmentName { name: name.into() }
    }

    /// Creates an out-of-bounds error.
    pub fn out_of_bounds(offset: u64, len: u64, size: u64) -> Self {
        Self::OutOfBounds { offset, len, size }
    }
}
