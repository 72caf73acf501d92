use serde::{Deserialize, Serialize};
use strongbox_compress::Compression;
use strongbox_crypto::KdfParams;
use time::OffsetDateTime;

/// Highest file format version this build can read and the version it writes.
pub const FORMAT_VERSION: u32 = 1;

/// Where a backup was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: Option<String>,
    pub os: String,
    pub arch: String,
}

impl DeviceInfo {
    pub fn current(name: Option<String>) -> Self {
        Self {
            name,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// The clear-text header of a backup file.
///
/// Written once and never modified. Fields this build does not know about are
/// ignored when reading, so newer writers can add fields without a version
/// bump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub id: String,
    pub version: u32,
    #[serde(with = "time::serde::timestamp::nanoseconds")]
    pub created_at: OffsetDateTime,
    pub is_incremental: bool,
    #[serde(default)]
    pub parent_backup_id: Option<String>,
    /// Number of incremental links between this backup and its full ancestor.
    #[serde(default)]
    pub chain_depth: u32,
    /// Size of the serialized container before compression.
    pub original_size: u64,
    /// Size of the payload after compression (before encryption).
    pub compressed_size: u64,
    pub compression: Compression,
    pub compressed: bool,
    pub deduplicated: bool,
    pub compression_ratio: f64,
    /// BLAKE3 checksum of the ciphertext.
    pub checksum: String,
    pub kdf: KdfParams,
    pub device: DeviceInfo,
    pub app_version: String,
}

impl BackupMetadata {
    /// Ratio of compressed to original size, `1.0` for an empty payload.
    pub fn ratio(original_size: u64, compressed_size: u64) -> f64 {
        if original_size == 0 {
            return 1.0;
        }
        compressed_size as f64 / original_size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn metadata() -> BackupMetadata {
        BackupMetadata {
            id: "b1".to_string(),
            version: FORMAT_VERSION,
            created_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            is_incremental: true,
            parent_backup_id: Some("b0".to_string()),
            chain_depth: 1,
            original_size: 1000,
            compressed_size: 250,
            compression: Compression::Gzip,
            compressed: true,
            deduplicated: false,
            compression_ratio: 0.25,
            checksum: "00".repeat(32),
            kdf: KdfParams { memory_kib: 64, iterations: 1, parallelism: 1 },
            device: DeviceInfo::current(Some("tablet".to_string())),
            app_version: "0.1.0".to_string(),
        }
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let mut value = serde_json::to_value(metadata()).unwrap();
        value["encrypted_with"] = serde_json::json!("future cipher");
        let parsed: BackupMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, metadata());
    }

    #[test]
    fn test_compression_is_stored_by_name() {
        let value = serde_json::to_value(metadata()).unwrap();
        assert_eq!(value["compression"], "gzip");
    }

    #[rstest]
    #[case(0, 0, 1.0)]
    #[case(1000, 250, 0.25)]
    #[case(100, 100, 1.0)]
    fn test_ratio(#[case] original: u64, #[case] compressed: u64, #[case] expected: f64) {
        assert!((BackupMetadata::ratio(original, compressed) - expected).abs() < f64::EPSILON);
    }
}
