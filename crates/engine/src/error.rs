//! Engine Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Failures from the lower crates (storage, catalog,
//! crypto, compression) are raised into one of the kinds below, keeping the
//! original error as a child frame.

use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Retryable
/// - [`ErrorKind::IoFailure`]
///
/// ### Fatal
/// Every other kind. Retrying with the same input gives the same answer.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The storage backend or the catalog could not be reached or written.
    #[display("I/O failure")]
    IoFailure,
    /// Malformed framing, truncated file, unreadable payload or an
    /// inconsistent delta chain.
    #[display("corrupt backup: {_0}")]
    CorruptBackup(#[error(not(source))] String),
    /// The checksum recorded in the header does not match the ciphertext.
    #[display("backup integrity check failed")]
    IntegrityViolation,
    /// Wrong password, or the encrypted payload does not belong to this
    /// header. Deliberately does not say which.
    #[display("authentication failed")]
    AuthenticationFailed,
    /// An ancestor of an incremental backup is missing.
    #[display("broken backup chain: {_0}")]
    BrokenChain(#[error(not(source))] String),
    /// The caller asked for something that cannot be done.
    #[display("invalid request: {_0}")]
    ValidationError(#[error(not(source))] String),
    /// The operation was cancelled before it committed anything.
    #[display("operation cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IoFailure)
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptBackup(reason.into())
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::ValidationError(reason.into())
    }
}
