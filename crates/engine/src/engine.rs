use crate::container::{BackupFile, LEN_PREFIX, metadata_len, read_metadata};
use crate::error::{ErrorKind, Result};
use crate::phase::{ProgressSender, Tracker};
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use strongbox_catalog::{BackupEntry, Catalog, Database};
use strongbox_compress::Compression;
use strongbox_config::{Config, DEFAULT_DEDUP_MIN_FILE_SIZE, DEFAULT_FULL_BACKUP_EVERY, DEFAULT_MAX_BACKUPS};
use strongbox_crypto::KdfParams;
use strongbox_models::{BackupMetadata, DeviceInfo};
use strongbox_storage::BackendHandle;
use strongbox_storage::backend::LocalBackend;
use strongbox_storage::error::ErrorKind as StorageErrorKind;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Settings that shape every backup an [`Engine`] creates.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Format used when a caller enables compression.
    pub compression: Compression,
    /// Used by [`Engine::create_backup`].
    pub compression_enabled: bool,
    /// Used by [`Engine::create_backup`].
    pub deduplication_enabled: bool,
    /// File descriptors at or below this size are not deduplicated.
    pub dedup_min_file_size: u64,
    /// Retention ring size.
    pub max_backups: usize,
    /// Maximum number of backups in one chain, the full backup included.
    pub full_backup_every: u32,
    pub kdf: KdfParams,
    pub device: DeviceInfo,
    pub app_version: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Gzip,
            compression_enabled: true,
            deduplication_enabled: true,
            dedup_min_file_size: DEFAULT_DEDUP_MIN_FILE_SIZE,
            max_backups: DEFAULT_MAX_BACKUPS,
            full_backup_every: DEFAULT_FULL_BACKUP_EVERY,
            kdf: KdfParams::default(),
            device: DeviceInfo::current(None),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            compression: config.compression,
            compression_enabled: config.compression_enabled,
            deduplication_enabled: config.deduplication_enabled,
            dedup_min_file_size: config.dedup_min_file_size,
            max_backups: config.max_backups,
            full_backup_every: config.full_backup_every,
            kdf: config.kdf,
            device: DeviceInfo::current(config.device_name.clone()),
            ..Self::default()
        }
    }
}

/// Creates, restores and manages backups.
///
/// Cloning is cheap; clones share the storage backend, the catalog, the
/// cancellation token and the progress channel.
#[derive(Clone)]
pub struct Engine {
    pub(crate) storage: BackendHandle,
    pub(crate) catalog: Catalog,
    pub(crate) options: EngineOptions,
    cancel: CancellationToken,
    progress: Option<ProgressSender>,
}

impl Engine {
    pub fn new(storage: BackendHandle, catalog: Catalog, options: EngineOptions) -> Self {
        Self { storage, catalog, options, cancel: CancellationToken::new(), progress: None }
    }

    /// Build an engine over the local filesystem and the SQLite catalog
    /// named in `config`.
    #[instrument(skip_all, fields(storage_root = %config.storage_root.display()))]
    pub async fn open(config: &Config) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::invalid("configuration is not valid"))?;
        let root = std::path::absolute(&config.storage_root).or_raise(|| ErrorKind::IoFailure)?;
        let storage: BackendHandle = Arc::new(LocalBackend::new("local", root).or_raise(|| ErrorKind::IoFailure)?);
        if let Some(parent) = config.catalog_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::IoFailure)?;
        }
        let database = Database::connect(&config.catalog_path).await.or_raise(|| ErrorKind::IoFailure)?;
        Ok(Self::new(storage, Catalog::from(&database), EngineOptions::from(config)))
    }

    /// Check `token` between pipeline steps; once it is cancelled, calls that
    /// have not committed anything fail with [`ErrorKind::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Send every phase transition to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub(crate) fn tracker(&self, operation: &'static str) -> Tracker {
        Tracker::new(operation, self.progress.clone(), self.cancel.clone())
    }

    /// Every backup in the catalog, oldest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        self.catalog.list_entries().await.or_raise(|| ErrorKind::IoFailure)
    }

    /// Read the clear-text metadata of a backup file. No password needed.
    pub async fn inspect(&self, backup_file: impl AsRef<Path>) -> Result<BackupMetadata> {
        let path = backup_file.as_ref();
        let prefix = self.storage.read_head(path, LEN_PREFIX).await.or_raise(|| ErrorKind::IoFailure)?;
        let len = metadata_len(&prefix)?;
        let head = self.storage.read_head(path, LEN_PREFIX + len).await.or_raise(|| ErrorKind::IoFailure)?;
        read_metadata(&head)
    }

    /// Check a backup file's framing and checksum without decrypting it.
    pub async fn verify(&self, backup_file: impl AsRef<Path>) -> Result<BackupMetadata> {
        let bytes = self.storage.read(backup_file.as_ref()).await.or_raise(|| ErrorKind::IoFailure)?;
        let file = BackupFile::decode(bytes)?;
        file.verify()?;
        Ok(file.metadata)
    }

    /// Remove a backup from the catalog, then its file.
    ///
    /// Returns `false` if `id` is not in the catalog. Backups that depend on
    /// this one are left in place and will fail to restore with
    /// [`ErrorKind::BrokenChain`].
    #[instrument(skip(self))]
    pub async fn delete_backup(&self, id: &str) -> Result<bool> {
        let entries = self.list_backups().await?;
        let Some(entry) = entries.iter().find(|entry| entry.id() == id) else {
            return Ok(false);
        };
        let dependents = entries.iter().filter(|other| other.parent_id() == Some(id)).count();
        if dependents > 0 {
            tracing::warn!(dependents, "deleting a backup other backups depend on");
        }
        self.catalog.delete_backup(id).await.or_raise(|| ErrorKind::IoFailure)?;
        match self.storage.delete(&entry.path).await {
            Ok(()) => (),
            Err(err) if matches!(&*err, StorageErrorKind::NotFound(_)) => {
                tracing::debug!(path = %entry.path.display(), "backup file already gone");
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::IoFailure),
        }
        tracing::info!(path = %entry.path.display(), "deleted backup");
        Ok(true)
    }
}
