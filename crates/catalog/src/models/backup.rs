use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use strongbox_compress::Compression;
use strongbox_models::{BackupData, BackupMetadata};

/// Snapshots are stored compressed; they compress extremely well.
const SNAPSHOT_COMPRESSION: Compression = Compression::Gzip;

/// A catalog entry without its snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupEntry {
    /// Location of the backup file, relative to the storage root.
    pub path: PathBuf,
    pub metadata: BackupMetadata,
}
impl BackupEntry {
    pub fn new(path: impl Into<PathBuf>, metadata: BackupMetadata) -> Self {
        Self { path: path.into(), metadata }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.metadata.parent_backup_id.as_deref()
    }
}

/// A catalog entry together with the snapshot the backup was taken from.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecord {
    pub entry: BackupEntry,
    pub snapshot: BackupData,
}
impl BackupRecord {
    pub fn new(entry: BackupEntry, snapshot: BackupData) -> Self {
        Self { entry, snapshot }
    }
}
impl Deref for BackupRecord {
    type Target = BackupEntry;
    fn deref(&self) -> &BackupEntry {
        &self.entry
    }
}

fn path_to_string(path: &Path) -> Result<String, Error> {
    Ok(path.to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string())
}

#[derive(Debug)]
pub(crate) struct NewBackupRow {
    pub(crate) id: String,
    pub(crate) path: String,
    pub(crate) parent_id: Option<String>,
    pub(crate) is_incremental: bool,
    pub(crate) chain_depth: i64,
    pub(crate) metadata: String,
    pub(crate) snapshot: Vec<u8>,
    pub(crate) created_at: i64,
}
impl TryFrom<&BackupRecord> for NewBackupRow {
    type Error = Error;
    fn try_from(record: &BackupRecord) -> Result<Self, Self::Error> {
        let metadata = &record.metadata;
        let snapshot = serde_json::to_vec(&record.snapshot).or_raise(|| ErrorKind::InvalidData("snapshot"))?;
        Ok(Self {
            id: metadata.id.clone(),
            path: path_to_string(&record.path)?,
            parent_id: metadata.parent_backup_id.clone(),
            is_incremental: metadata.is_incremental,
            chain_depth: i64::from(metadata.chain_depth),
            metadata: serde_json::to_string(metadata).or_raise(|| ErrorKind::InvalidData("metadata"))?,
            snapshot: SNAPSHOT_COMPRESSION.compress(&snapshot).or_raise(|| ErrorKind::InvalidData("snapshot"))?,
            created_at: metadata.created_at.unix_timestamp(),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub(crate) id: String,
    pub(crate) path: String,
    pub(crate) metadata: String,
}
impl TryFrom<EntryRow> for BackupEntry {
    type Error = Error;
    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let metadata: BackupMetadata =
            serde_json::from_str(&row.metadata).or_raise(|| ErrorKind::InvalidData("metadata"))?;
        if metadata.id != row.id {
            exn::bail!(ErrorKind::InvalidData("metadata id"));
        }
        Ok(Self::new(row.path, metadata))
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BackupRow {
    pub(crate) id: String,
    pub(crate) path: String,
    pub(crate) metadata: String,
    pub(crate) snapshot: Vec<u8>,
}
impl TryFrom<BackupRow> for BackupRecord {
    type Error = Error;
    fn try_from(row: BackupRow) -> Result<Self, Self::Error> {
        let entry = BackupEntry::try_from(EntryRow { id: row.id, path: row.path, metadata: row.metadata })?;
        let snapshot = SNAPSHOT_COMPRESSION.decompress(&row.snapshot).or_raise(|| ErrorKind::InvalidData("snapshot"))?;
        let snapshot = serde_json::from_slice(&snapshot).or_raise(|| ErrorKind::InvalidData("snapshot"))?;
        Ok(Self::new(entry, snapshot))
    }
}
