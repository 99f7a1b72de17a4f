//! Error and status types for the coroutine runtime.

use std::io;
use thiserror::Error;

/// Result type for coroutine operations.
pub type CoroutineResult<T> = Result<T, CoroutineError>;

/// Status delivered to a suspended coroutine when it is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationStatus {
    /// Resumed normally; the awaited operation has completed.
    Ok,
    /// Resumed because the owning service or manager is shutting down.
    Interrupted,
}

impl ContinuationStatus {
    /// Returns true if this is the shutdown signal.
    #[must_use]
    pub const fn is_interrupted(self) -> bool {
        matches!(self, ContinuationStatus::Interrupted)
    }
}

/// Errors that can occur in the coroutine runtime.
#[derive(Debug, Error)]
pub enum CoroutineError {
    /// The coroutine was interrupted and must unwind.
    #[error("coroutine interrupted")]
    Interrupted,

    /// The service no longer accepts new coroutines.
    #[error("coroutine service is shut down")]
    ShutDown,

    /// A new execution context could not be created.
    #[error("failed to spawn execution context: {0}")]
    Spawn(#[from] io::Error),
}

impl CoroutineError {
    /// Returns true if this is the shutdown signal rather than a failure.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CoroutineError::Interrupted | CoroutineError::ShutDown)
    }
}
