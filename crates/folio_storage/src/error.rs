//! Error types for storage operations.

use crate::object::ObjectId;
use crate::status::Status;
use folio_codec::CodecError;
use folio_coroutine::CoroutineError;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// The requested object is not in the store.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// Stored data does not verify against its identity or format.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// An object failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The caller passed malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation was interrupted by shutdown.
    #[error("interrupted")]
    Interrupted,
}

impl StorageError {
    /// Create a corrupted error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns true if this is the shutdown signal rather than a failure.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Maps this error onto the closed status enumeration.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::Interrupted => Status::InterruptedShutdown,
            Self::InvalidArgument(_) => Status::InvalidArgument,
            Self::Io(_) | Self::ReadPastEnd { .. } | Self::Corrupted(_) | Self::Codec(_) => {
                Status::InternalIoError
            }
        }
    }
}

impl From<CoroutineError> for StorageError {
    fn from(err: CoroutineError) -> Self {
        match err {
            CoroutineError::Interrupted | CoroutineError::ShutDown => Self::Interrupted,
            CoroutineError::Spawn(io) => Self::Io(io),
        }
    }
}

/// Returns the status of a result: `Ok` on success, the error's status otherwise.
pub fn status_of<T>(result: &StorageResult<T>) -> Status {
    result.as_ref().map_or_else(StorageError::status, |_| Status::Ok)
}
