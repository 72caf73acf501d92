//! The backup file format.
//!
//! ```text
//! +-------------+----------------+------+-----+------------------------------+
//! | u32 BE len  | metadata JSON  | salt | IV  | ciphertext                   |
//! | 4 bytes     | `len` bytes    | 16 B | 12 B| AES-256-GCM(compressed JSON) |
//! +-------------+----------------+------+-----+------------------------------+
//! ```
//!
//! The metadata is stored in the clear so a backup can be listed and its
//! chain discovered without the password. The plaintext of the ciphertext is
//! a [`BackupContainer`], optionally compressed with the format named in the
//! metadata. Every header field except the checksum and the compression
//! ratio is bound to the ciphertext as associated data (see
//! [`associated_data`]), so an edited header fails to decrypt. The BLAKE3
//! checksum of the ciphertext is recorded in the metadata.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strongbox_compress::Compression;
use strongbox_crypto::error::ErrorKind as CryptoErrorKind;
use strongbox_crypto::{IV_LEN, KdfParams, SALT_LEN, Sealed, open, verify_checksum};
use strongbox_models::{BackupMetadata, DeltaChanges, DeviceInfo, FORMAT_VERSION};

/// Size of the metadata length prefix.
pub const LEN_PREFIX: usize = 4;
/// Metadata headers larger than this are rejected without being parsed.
pub const MAX_METADATA_LEN: usize = 1024 * 1024;
/// An AES-GCM ciphertext is never shorter than its authentication tag.
const TAG_LEN: usize = 16;

/// The encrypted payload of a backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupContainer {
    pub version: u32,
    /// Must match the id in the clear-text metadata.
    pub backup_id: String,
    #[serde(default)]
    pub delta: DeltaChanges,
    /// Content hash to canonical identifier, see [`DedupMap`](crate::DedupMap).
    #[serde(default)]
    pub dedup: BTreeMap<String, String>,
}

impl BackupContainer {
    pub fn new(backup_id: impl Into<String>, delta: DeltaChanges, dedup: BTreeMap<String, String>) -> Self {
        Self { version: FORMAT_VERSION, backup_id: backup_id.into(), delta, dedup }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).or_raise(|| ErrorKind::invalid("backup data could not be serialized"))
    }

    /// Parse a decrypted (and decompressed) payload and check that it belongs
    /// to `metadata`.
    pub fn from_bytes(bytes: &[u8], metadata: &BackupMetadata) -> Result<Self> {
        let container: Self =
            serde_json::from_slice(bytes).or_raise(|| ErrorKind::corrupt("payload is not a backup container"))?;
        if container.version > FORMAT_VERSION {
            exn::bail!(ErrorKind::corrupt(format!("unsupported container version {}", container.version)));
        }
        if container.backup_id != metadata.id {
            exn::bail!(ErrorKind::corrupt(format!(
                "payload belongs to backup {}, not {}",
                container.backup_id, metadata.id
            )));
        }
        Ok(container)
    }
}

/// The header as authenticated by AES-GCM.
///
/// The checksum is left out because it is computed from the ciphertext, and
/// the ratio because it is a float derived from the two sizes.
#[derive(Serialize)]
struct AuthenticatedHeader<'a> {
    id: &'a str,
    version: u32,
    created_at: i128,
    is_incremental: bool,
    parent_backup_id: Option<&'a str>,
    chain_depth: u32,
    original_size: u64,
    compressed_size: u64,
    compression: Compression,
    compressed: bool,
    deduplicated: bool,
    kdf: KdfParams,
    device: &'a DeviceInfo,
    app_version: &'a str,
}

/// The associated data sealed with a backup's payload.
pub fn associated_data(metadata: &BackupMetadata) -> Result<Vec<u8>> {
    let header = AuthenticatedHeader {
        id: &metadata.id,
        version: metadata.version,
        created_at: metadata.created_at.unix_timestamp_nanos(),
        is_incremental: metadata.is_incremental,
        parent_backup_id: metadata.parent_backup_id.as_deref(),
        chain_depth: metadata.chain_depth,
        original_size: metadata.original_size,
        compressed_size: metadata.compressed_size,
        compression: metadata.compression,
        compressed: metadata.compressed,
        deduplicated: metadata.deduplicated,
        kdf: metadata.kdf,
        device: &metadata.device,
        app_version: &metadata.app_version,
    };
    serde_json::to_vec(&header).or_raise(|| ErrorKind::invalid("metadata could not be serialized"))
}

/// Read the metadata length from the first [`LEN_PREFIX`] bytes of a file.
pub fn metadata_len(bytes: &[u8]) -> Result<usize> {
    let prefix: [u8; LEN_PREFIX] = bytes
        .get(..LEN_PREFIX)
        .and_then(|prefix| prefix.try_into().ok())
        .ok_or_else(|| exn::Exn::from(ErrorKind::corrupt("file is shorter than its length prefix")))?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len == 0 || len > MAX_METADATA_LEN {
        exn::bail!(ErrorKind::corrupt(format!("declared metadata length {len} is out of range")));
    }
    Ok(len)
}

/// Parse and check a metadata header.
pub fn parse_metadata(bytes: &[u8]) -> Result<BackupMetadata> {
    let metadata: BackupMetadata =
        serde_json::from_slice(bytes).or_raise(|| ErrorKind::corrupt("metadata header is not valid"))?;
    if metadata.version > FORMAT_VERSION {
        exn::bail!(ErrorKind::corrupt(format!("unsupported format version {}", metadata.version)));
    }
    metadata.kdf.validate().or_raise(|| ErrorKind::corrupt("key derivation parameters are out of range"))?;
    Ok(metadata)
}

/// Read only the metadata from the start of a file.
///
/// `head` may be the whole file or just its first `LEN_PREFIX + len` bytes.
pub fn read_metadata(head: &[u8]) -> Result<BackupMetadata> {
    let len = metadata_len(head)?;
    let bytes = head
        .get(LEN_PREFIX..LEN_PREFIX + len)
        .ok_or_else(|| exn::Exn::from(ErrorKind::corrupt("metadata header is truncated")))?;
    parse_metadata(bytes)
}

/// Frame a sealed payload behind its metadata header.
pub fn encode(metadata: &BackupMetadata, sealed: &Sealed) -> Result<Vec<u8>> {
    let header = serde_json::to_vec(metadata).or_raise(|| ErrorKind::invalid("metadata could not be serialized"))?;
    if header.len() > MAX_METADATA_LEN {
        exn::bail!(ErrorKind::invalid("metadata header is too large"));
    }
    let len = u32::try_from(header.len()).or_raise(|| ErrorKind::invalid("metadata header is too large"))?;
    let mut bytes = Vec::with_capacity(LEN_PREFIX + header.len() + SALT_LEN + IV_LEN + sealed.ciphertext.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(&sealed.salt);
    bytes.extend_from_slice(&sealed.iv);
    bytes.extend_from_slice(&sealed.ciphertext);
    Ok(bytes)
}

/// A backup file split into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupFile {
    pub metadata: BackupMetadata,
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl BackupFile {
    /// Split a complete file. Truncated or malformed framing is
    /// [`ErrorKind::CorruptBackup`]; nothing is decrypted.
    pub fn decode(mut bytes: Vec<u8>) -> Result<Self> {
        let len = metadata_len(&bytes)?;
        let header_end = LEN_PREFIX + len;
        let payload_start = header_end + SALT_LEN + IV_LEN;
        if bytes.len() < payload_start + TAG_LEN {
            exn::bail!(ErrorKind::corrupt(format!(
                "file is {} bytes, expected at least {}",
                bytes.len(),
                payload_start + TAG_LEN
            )));
        }
        let ciphertext = bytes.split_off(payload_start);
        let metadata = parse_metadata(&bytes[LEN_PREFIX..header_end])?;
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[header_end..header_end + SALT_LEN]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[header_end + SALT_LEN..payload_start]);
        Ok(Self { metadata, salt, iv, ciphertext })
    }

    /// Recompute the ciphertext checksum.
    pub fn verify(&self) -> Result<()> {
        if !verify_checksum(&self.ciphertext, &self.metadata.checksum) {
            exn::bail!(ErrorKind::IntegrityViolation);
        }
        Ok(())
    }

    /// Decrypt the payload. Call [`verify`](Self::verify) first.
    pub fn decrypt(&self, password: &str) -> Result<Vec<u8>> {
        let aad = associated_data(&self.metadata)?;
        match open(password, &self.salt, &self.iv, &self.ciphertext, &aad, &self.metadata.kdf) {
            Ok(plaintext) => Ok(plaintext),
            // The parameters come from the header, so bad ones mean a bad header.
            Err(err) if matches!(&*err, CryptoErrorKind::KeyDerivation) => {
                Err(err).or_raise(|| ErrorKind::corrupt("invalid key derivation parameters"))
            },
            Err(err) => Err(err).or_raise(|| ErrorKind::AuthenticationFailed),
        }
    }

    /// Undo compression, if the metadata says the payload is compressed. The
    /// result must be exactly as long as the metadata records.
    pub fn decompress(&self, plaintext: Vec<u8>) -> Result<Vec<u8>> {
        let compression = match self.metadata.compressed {
            true => self.metadata.compression,
            false => Compression::None,
        };
        if !compression.matches_payload(&plaintext) {
            exn::bail!(ErrorKind::corrupt(format!("payload is not {compression} compressed")));
        }
        let expected = self.metadata.original_size;
        if !compression.is_enabled() {
            if plaintext.len() as u64 != expected {
                exn::bail!(ErrorKind::corrupt(format!("payload is {} bytes, expected {expected}", plaintext.len())));
            }
            return Ok(plaintext);
        }
        compression
            .decompress_exact(&plaintext, expected)
            .or_raise(|| ErrorKind::corrupt("payload does not decompress to its recorded size"))
    }

    /// Decompress and parse a decrypted payload.
    pub fn unpack(&self, plaintext: Vec<u8>) -> Result<BackupContainer> {
        let payload = self.decompress(plaintext)?;
        BackupContainer::from_bytes(&payload, &self.metadata)
    }

    /// Verify, decrypt and unpack in one go.
    pub fn open(&self, password: &str) -> Result<BackupContainer> {
        self.verify()?;
        let plaintext = self.decrypt(password)?;
        self.unpack(plaintext)
    }
}
