//! Crypto Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A crypto error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for crypto operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The key derivation parameters are outside what Argon2 accepts.
    #[display("invalid key derivation parameters")]
    KeyDerivation,
    /// Sealing the plaintext failed.
    #[display("encryption failed")]
    Encryption,
    /// The ciphertext did not authenticate: wrong password, tampered salt/IV
    /// or ciphertext, or mismatched associated data. Deliberately does not say
    /// which.
    #[display("authentication failed")]
    AuthenticationFailed,
    /// A record could not be serialized for hashing.
    #[display("record serialization failed")]
    Serialization,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
