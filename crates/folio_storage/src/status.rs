//! The closed status enumeration reported at the core boundary.

use std::fmt;

/// Outcome of a core operation, as seen from outside the core.
///
/// Every error type in Folio maps onto exactly one of these through its
/// `status()` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The operation succeeded.
    Ok,
    /// A requested object, commit or key does not exist.
    NotFound,
    /// The operation was cut short by shutdown. Not a failure.
    InterruptedShutdown,
    /// Storage failed or returned data that does not verify.
    InternalIoError,
    /// The caller passed malformed input.
    InvalidArgument,
}

impl Status {
    /// Returns true for [`Status::Ok`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::NotFound => "NOT_FOUND",
            Status::InterruptedShutdown => "INTERRUPTED",
            Status::InternalIoError => "IO_ERROR",
            Status::InvalidArgument => "INVALID_ARGUMENT",
        };
        f.write_str(name)
    }
}
