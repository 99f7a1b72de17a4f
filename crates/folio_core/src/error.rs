//! Error types for Folio core.

use crate::commit::CommitId;
use folio_codec::CodecError;
use folio_coroutine::CoroutineError;
use folio_storage::{Status, StorageError};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in commit graph operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Object storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The commit is not in the graph.
    #[error("commit not found: {0}")]
    CommitNotFound(CommitId),

    /// A commit's bytes do not match its id or do not decode.
    #[error("invalid commit: {message}")]
    InvalidCommit {
        /// Description of the problem.
        message: String,
    },

    /// A commit was added before one of its parents.
    #[error("commit {commit} added before its parent {parent}")]
    MissingParent {
        /// The commit being added.
        commit: CommitId,
        /// The unknown parent.
        parent: CommitId,
    },

    /// The caller passed malformed input.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The operation was interrupted by shutdown.
    #[error("interrupted")]
    Interrupted,
}

impl CoreError {
    /// Creates an invalid commit error.
    pub fn invalid_commit(message: impl Into<String>) -> Self {
        Self::InvalidCommit {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true if this is the shutdown signal rather than a failure.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Interrupted => true,
            Self::Storage(e) => e.is_interrupted(),
            _ => false,
        }
    }

    /// Maps this error onto the closed status enumeration.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Storage(e) => e.status(),
            Self::CommitNotFound(_) => Status::NotFound,
            Self::Interrupted => Status::InterruptedShutdown,
            Self::MissingParent { .. } | Self::InvalidArgument { .. } => Status::InvalidArgument,
            Self::Codec(_) | Self::InvalidCommit { .. } => Status::InternalIoError,
        }
    }
}

impl From<CoroutineError> for CoreError {
    fn from(err: CoroutineError) -> Self {
        Self::Storage(StorageError::from(err))
    }
}
