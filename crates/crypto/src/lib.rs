//! Hashing, integrity checksums and password-based encryption.
//!
//! - [`hash`]: BLAKE3 content addressing for byte buffers and structured
//!   records (deduplication keys), plus the checksum computed over the final
//!   ciphertext of a backup file.
//! - [`cipher`]: Argon2id key derivation from a password and a per-backup
//!   random salt, and AES-256-GCM sealing with a per-backup random IV.
//!
//! Passwords and derived keys never appear in logs or `Debug` output.

pub mod cipher;
pub mod error;
pub mod hash;

pub use crate::cipher::{IV_LEN, KdfParams, SALT_LEN, Sealed, open, seal};
pub use crate::hash::{checksum, hash_bytes, hash_record, verify_checksum};
