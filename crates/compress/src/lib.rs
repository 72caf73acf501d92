//! Compression of backup payloads.
//!
//! A backup container is serialized to one buffer, compressed as a whole and
//! only then encrypted. The format is chosen once per backup and recorded by
//! name in the clear-text metadata, so [`Compression`] parses from and prints
//! as that name. On restore the decrypted payload is checked against the
//! format's magic bytes ([`Compression::matches_payload`]) before decoding,
//! and decoding stops once the size recorded in the metadata is exceeded
//! ([`Compression::decompress_exact`]).
//!
//! Bzip2 and Gzip are always built; Zstd sits behind the default `zstd`
//! feature. [`Compression::None`] passes bytes through untouched, which is how
//! a backup with compression disabled takes the same path as any other.

mod codec;
pub mod error;
mod format;
#[cfg(feature = "serde")]
mod serialize;

use derive_more::Display;

/// A payload compression format.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Stored as-is.
    #[default]
    #[display("none")]
    None,
    #[display("bzip2")]
    Bzip2,
    #[display("gzip")]
    Gzip,
    #[cfg(feature = "zstd")]
    #[display("zstd")]
    Zstd,
}

impl Compression {
    /// Every format built into this binary, pass-through first.
    pub const ALL: &[Compression] = &[
        Compression::None,
        Compression::Bzip2,
        Compression::Gzip,
        #[cfg(feature = "zstd")]
        Compression::Zstd,
    ];

    /// `false` only for the pass-through format.
    #[inline]
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self != Compression::None
    }
}
