//! BLAKE3 content hashing.
//!
//! All hashes are lowercase hex strings so they can be used directly as map
//! keys, stored in JSON metadata and compared across versions.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Serialize;

/// Hash an arbitrary byte buffer.
///
/// ```
/// let a = strongbox_crypto::hash_bytes(b"page one");
/// let b = strongbox_crypto::hash_bytes(b"page one");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_string()
}

/// Hash a structured record through its stable serialization.
///
/// Serialization follows field declaration order and `BTreeMap` key order,
/// so two structurally equal records always hash the same.
pub fn hash_record<T: Serialize + ?Sized>(record: &T) -> Result<String> {
    let bytes = serde_json::to_vec(record).or_raise(|| ErrorKind::Serialization)?;
    Ok(hash_bytes(&bytes))
}

/// Integrity checksum of the final (encrypted) byte stream of a backup.
#[must_use]
pub fn checksum(bytes: &[u8]) -> String {
    hash_bytes(bytes)
}

/// Recompute the checksum of `bytes` and compare it with `expected`.
///
/// A malformed `expected` value never matches. The comparison itself is
/// constant-time.
#[must_use]
pub fn verify_checksum(bytes: &[u8], expected: &str) -> bool {
    match blake3::Hash::from_hex(expected) {
        Ok(expected) => blake3::hash(bytes) == expected,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Record {
        id: &'static str,
        title: &'static str,
        tags: BTreeMap<&'static str, u32>,
    }

    #[test]
    fn test_hash_is_hex_blake3() {
        // BLAKE3 of the empty input.
        assert_eq!(hash_bytes(b""), "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262");
    }

    #[test]
    fn test_record_hash_is_stable() {
        let mut first = BTreeMap::new();
        first.insert("read", 3);
        first.insert("favourite", 1);
        let mut second = BTreeMap::new();
        second.insert("favourite", 1);
        second.insert("read", 3);
        let a = Record { id: "c1", title: "Nausicaa", tags: first };
        let b = Record { id: "c1", title: "Nausicaa", tags: second };
        assert_eq!(hash_record(&a).unwrap(), hash_record(&b).unwrap());
    }

    #[test]
    fn test_record_hash_differs_on_content() {
        let a = Record { id: "c1", title: "Nausicaa", tags: BTreeMap::new() };
        let b = Record { id: "c1", title: "Nausicaa 2", tags: BTreeMap::new() };
        assert_ne!(hash_record(&a).unwrap(), hash_record(&b).unwrap());
    }

    #[test]
    fn test_verify_checksum() {
        let data = b"ciphertext bytes";
        let sum = checksum(data);
        assert!(verify_checksum(data, &sum));
        assert!(!verify_checksum(b"ciphertext bytez", &sum));
        assert!(!verify_checksum(data, "not-a-hash"));
        assert!(!verify_checksum(data, ""));
    }
}
