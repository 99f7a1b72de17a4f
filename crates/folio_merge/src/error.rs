//! Error types for merging.

use folio_core::CoreError;
use folio_coroutine::CoroutineError;
use folio_storage::{Status, StorageError};
use thiserror::Error;

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that can occur while merging two heads.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Commit graph error.
    #[error("commit graph error: {0}")]
    Core(#[from] CoreError),

    /// Object storage or tree error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The strategy could not produce a merge.
    #[error("merge strategy failed: {message}")]
    Strategy {
        /// Description of the failure.
        message: String,
    },

    /// The strategy was replaced while the merge was in flight.
    #[error("merge cancelled")]
    Cancelled,
}

impl MergeError {
    /// Creates a strategy error.
    pub fn strategy(message: impl Into<String>) -> Self {
        Self::Strategy {
            message: message.into(),
        }
    }

    /// Returns true if the merge was cut short rather than failed.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Core(e) => e.is_interrupted(),
            Self::Storage(e) => e.is_interrupted(),
            Self::Cancelled => true,
            Self::Strategy { .. } => false,
        }
    }

    /// Maps this error onto the closed status enumeration.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Core(e) => e.status(),
            Self::Storage(e) => e.status(),
            Self::Strategy { .. } => Status::InvalidArgument,
            Self::Cancelled => Status::InterruptedShutdown,
        }
    }
}

impl From<CoroutineError> for MergeError {
    fn from(err: CoroutineError) -> Self {
        Self::Storage(StorageError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruption_is_not_a_failure() {
        assert!(MergeError::from(CoroutineError::Interrupted).is_interrupted());
        assert!(MergeError::from(CoreError::Interrupted).is_interrupted());
        assert!(MergeError::Cancelled.is_interrupted());
        assert!(!MergeError::strategy("no answer").is_interrupted());
    }

    #[test]
    fn errors_map_to_status() {
        assert_eq!(
            MergeError::strategy("unknown key").status(),
            Status::InvalidArgument
        );
        assert_eq!(
            MergeError::from(CoroutineError::ShutDown).status(),
            Status::InterruptedShutdown
        );
        assert_eq!(
            MergeError::from(CoreError::invalid_commit("bad hash")).status(),
            Status::InternalIoError
        );
    }
}
