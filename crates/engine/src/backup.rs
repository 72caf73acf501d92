//! Creating backups and enforcing retention.

use crate::container::{BackupContainer, associated_data, encode};
use crate::dedup::DedupMap;
use crate::delta::calculate_delta;
use crate::error::{ErrorKind, Result};
use crate::phase::{Phase, Tracker};
use crate::{Engine, blocking};
use exn::ResultExt;
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use strongbox_catalog::{BackupEntry, BackupRecord, Catalog};
use strongbox_compress::Compression;
use strongbox_crypto::error::ErrorKind as CryptoErrorKind;
use strongbox_crypto::{checksum, seal};
use strongbox_models::{BackupData, BackupMetadata, DeltaChanges, FORMAT_VERSION};
use strongbox_storage::error::ErrorKind as StorageErrorKind;
use strongbox_storage::{BackendHandle, validate_path};
use time::OffsetDateTime;
use tracing::instrument;

/// The outcome of a successful backup.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupSummary {
    pub metadata: BackupMetadata,
    pub path: PathBuf,
    /// Size of the file written, header included.
    pub file_size: u64,
    /// Records changed since the parent (every record for a full backup).
    pub changes: usize,
    /// Content hashes recorded in the deduplication map.
    pub dedup_entries: usize,
    /// Bytes of repeated file content found while deduplicating.
    pub dedup_savings: u64,
    /// Backups removed by retention afterwards, oldest first.
    pub evicted: Vec<String>,
    pub duration: Duration,
}

impl BackupSummary {
    pub fn is_incremental(&self) -> bool {
        self.metadata.is_incremental
    }
}

fn new_backup_id(now: OffsetDateTime) -> String {
    format!("{}-{:016x}", now.unix_timestamp(), rand::random::<u64>())
}

/// Write the file, then record it. If recording fails the file is removed
/// again, so a file without a catalog row never outlives this function.
async fn persist(storage: BackendHandle, catalog: Catalog, record: BackupRecord, bytes: Vec<u8>, tracker: Tracker) -> Result<()> {
    match storage.create(&record.path, &bytes).await {
        Ok(()) => (),
        // Another backup claimed the path after the up-front check.
        Err(err) if matches!(err.deref(), StorageErrorKind::AlreadyExists(_)) => {
            let path = record.path.display().to_string();
            return Err(err).or_raise(|| ErrorKind::invalid(format!("{path} already exists")));
        },
        Err(err) => return Err(err).or_raise(|| ErrorKind::IoFailure),
    }
    tracker.report(Phase::Cataloging);
    if let Err(err) = catalog.insert_backup(&record).await {
        if let Err(cleanup) = storage.delete(&record.path).await {
            tracing::warn!(path = %record.path.display(), error = %cleanup.deref(), "could not remove uncatalogued backup file");
        }
        return Err(err).or_raise(|| ErrorKind::IoFailure);
    }
    Ok(())
}

/// Pick the backups retention removes: the oldest beyond `max_backups`, then
/// any backup whose parent is removed. Neither `keep` nor any backup it needs
/// to restore is ever picked.
pub(crate) fn select_evictions<'a>(entries: &'a [BackupEntry], max_backups: usize, keep: &str) -> Vec<&'a BackupEntry> {
    let by_id: HashMap<&str, &BackupEntry> = entries.iter().map(|entry| (entry.id(), entry)).collect();
    let mut protected: HashSet<&str> = HashSet::new();
    let mut next = Some(keep);
    while let Some(id) = next
        && protected.insert(id)
    {
        next = by_id.get(id).and_then(|entry| entry.parent_id());
    }

    let excess = entries.len().saturating_sub(max_backups);
    let mut evicted: HashSet<&str> = HashSet::new();
    let mut selected = Vec::new();
    // Entries are oldest first, so parents are always seen before children.
    for (position, entry) in entries.iter().enumerate() {
        if protected.contains(entry.id()) {
            continue;
        }
        let orphaned = entry.parent_id().is_some_and(|parent| evicted.contains(parent));
        if position < excess || orphaned {
            evicted.insert(entry.id());
            selected.push(entry);
        }
    }
    selected
}

impl Engine {
    /// Take a backup of `data` and write it to `target` (relative to the
    /// storage root).
    ///
    /// The backup is incremental against the most recent backup in the
    /// catalog, unless there is none, its file is gone, or the chain has
    /// reached [`full_backup_every`](crate::EngineOptions::full_backup_every).
    /// Either the file and its catalog row both exist afterwards, or neither
    /// does.
    #[instrument(skip_all, fields(target = %target.as_ref().display()))]
    pub async fn create_incremental_backup(
        &self,
        data: BackupData,
        password: &str,
        target: impl AsRef<Path>,
        compression_enabled: bool,
        deduplication_enabled: bool,
    ) -> Result<BackupSummary> {
        let tracker = self.tracker("backup");
        let compression = match compression_enabled {
            true => self.options.compression,
            false => Compression::None,
        };
        let result = self
            .create(&tracker, data, password, target.as_ref(), compression, deduplication_enabled)
            .await;
        tracker.finish(result)
    }

    /// [`create_incremental_backup`](Self::create_incremental_backup) with
    /// compression and deduplication as configured in
    /// [`EngineOptions`](crate::EngineOptions).
    pub async fn create_backup(&self, data: BackupData, password: &str, target: impl AsRef<Path>) -> Result<BackupSummary> {
        let (compression, dedup) = (self.options.compression_enabled, self.options.deduplication_enabled);
        self.create_incremental_backup(data, password, target, compression, dedup).await
    }

    /// The most recent backup to diff against, or `None` for a full backup.
    async fn parent(&self) -> Result<Option<BackupRecord>> {
        let Some(last) = self.catalog.get_last_backup().await.or_raise(|| ErrorKind::IoFailure)? else {
            return Ok(None);
        };
        if last.metadata.chain_depth.saturating_add(1) >= self.options.full_backup_every {
            tracing::info!(parent = %last.id(), depth = last.metadata.chain_depth, "chain is full, taking a full backup");
            return Ok(None);
        }
        if !self.storage.exists(&last.path).await.or_raise(|| ErrorKind::IoFailure)? {
            tracing::warn!(parent = %last.id(), path = %last.path.display(), "last backup file is missing, taking a full backup");
            return Ok(None);
        }
        Ok(Some(last))
    }

    async fn create(
        &self,
        tracker: &Tracker,
        data: BackupData,
        password: &str,
        target: &Path,
        compression: Compression,
        deduplication_enabled: bool,
    ) -> Result<BackupSummary> {
        let started = Instant::now();
        if password.is_empty() {
            exn::bail!(ErrorKind::invalid("password must not be empty"));
        }

        tracker.enter(Phase::Snapshotting)?;
        if let Some((kind, id)) = data.duplicate_id() {
            exn::bail!(ErrorKind::invalid(format!("snapshot holds more than one {kind} with id {id}")));
        }
        let target = validate_path(target).or_raise(|| ErrorKind::invalid("target is not a valid storage path"))?;
        if self.storage.exists(&target).await.or_raise(|| ErrorKind::IoFailure)? {
            exn::bail!(ErrorKind::invalid(format!("{} already exists", target.display())));
        }
        let parent = self.parent().await?;
        let created_at = OffsetDateTime::now_utc();
        let id = new_backup_id(created_at);

        tracker.enter(Phase::Diffing)?;
        let (parent_id, chain_depth) = match &parent {
            Some(parent) => (Some(parent.id().to_string()), parent.metadata.chain_depth + 1),
            None => (None, 0),
        };
        let (data, delta) = blocking(move || {
            let delta = match parent {
                Some(parent) => calculate_delta(Some(&parent.snapshot), &data),
                None => DeltaChanges::full(&data),
            };
            Ok((data, delta))
        })
        .await?;
        let changes = delta.change_count();

        tracker.enter(Phase::Deduplicating)?;
        let dedup = match deduplication_enabled {
            true => DedupMap::build(&delta, self.options.dedup_min_file_size)?,
            false => DedupMap::default(),
        };
        let (dedup_entries, dedup_savings) = (dedup.len(), dedup.saved_bytes());

        tracker.enter(Phase::Serializing)?;
        let container = BackupContainer::new(id.clone(), delta, dedup.into_entries());
        let plaintext = container.to_bytes()?;
        let original_size = plaintext.len() as u64;

        tracker.enter(Phase::Compressing)?;
        let payload = blocking(move || compression.compress(&plaintext).or_raise(|| ErrorKind::IoFailure)).await?;
        let compressed_size = payload.len() as u64;

        tracker.enter(Phase::Encrypting)?;
        let mut metadata = BackupMetadata {
            id: id.clone(),
            version: FORMAT_VERSION,
            created_at,
            is_incremental: parent_id.is_some(),
            parent_backup_id: parent_id,
            chain_depth,
            original_size,
            compressed_size,
            compression,
            compressed: compression.is_enabled(),
            deduplicated: deduplication_enabled,
            compression_ratio: BackupMetadata::ratio(original_size, compressed_size),
            checksum: String::new(),
            kdf: self.options.kdf,
            device: self.options.device.clone(),
            app_version: self.options.app_version.clone(),
        };
        let (owned_password, aad, kdf) = (password.to_string(), associated_data(&metadata)?, self.options.kdf);
        let sealed = blocking(move || match seal(&owned_password, &payload, &aad, &kdf) {
            Ok(sealed) => Ok(sealed),
            Err(err) if matches!(&*err, CryptoErrorKind::KeyDerivation) => {
                Err(err).or_raise(|| ErrorKind::invalid("key derivation parameters are out of range"))
            },
            Err(err) => Err(err).or_raise(|| ErrorKind::IoFailure),
        })
        .await?;
        metadata.checksum = checksum(&sealed.ciphertext);
        let bytes = encode(&metadata, &sealed)?;
        let file_size = bytes.len() as u64;

        // Last chance to back out; from here the write and the catalog insert
        // run to completion together even if this future is dropped.
        tracker.enter(Phase::Writing)?;
        let record = BackupRecord::new(BackupEntry::new(target.clone(), metadata.clone()), data);
        let persisting = persist(self.storage.clone(), self.catalog.clone(), record, bytes, tracker.clone());
        tokio::spawn(persisting).await.or_raise(|| ErrorKind::IoFailure)??;
        tracing::info!(
            %id,
            incremental = metadata.is_incremental,
            original_size,
            compressed_size,
            ratio = metadata.compression_ratio,
            changes,
            "created backup"
        );

        tracker.report(Phase::CleaningUp);
        let evicted = self.enforce_retention(&id).await;

        Ok(BackupSummary {
            metadata,
            path: target,
            file_size,
            changes,
            dedup_entries,
            dedup_savings,
            evicted,
            duration: started.elapsed(),
        })
    }

    /// Evict old backups. Failures are logged, never returned: the backup that
    /// triggered retention has already been committed.
    async fn enforce_retention(&self, keep: &str) -> Vec<String> {
        let entries = match self.catalog.list_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %err.deref(), "could not list backups for retention");
                return Vec::new();
            },
        };
        let mut evicted = Vec::new();
        for entry in select_evictions(&entries, self.options.max_backups, keep) {
            match self.catalog.delete_backup(entry.id()).await {
                Ok(_) => evicted.push(entry.id().to_string()),
                Err(err) => {
                    tracing::warn!(id = %entry.id(), error = %err.deref(), "could not evict backup from catalog");
                    continue;
                },
            }
            match self.storage.delete(&entry.path).await {
                Ok(()) => (),
                Err(err) if matches!(err.deref(), StorageErrorKind::NotFound(_)) => (),
                Err(err) => {
                    tracing::warn!(path = %entry.path.display(), error = %err.deref(), "could not delete evicted backup file");
                },
            }
        }
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "retention evicted backups");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::metadata;
    use rstest::rstest;

    fn entries(chain: &[(&str, Option<&str>)]) -> Vec<BackupEntry> {
        chain.iter().map(|(id, parent)| BackupEntry::new(format!("{id}.sbx"), metadata(id, *parent))).collect()
    }

    fn ids<'a>(selected: &[&'a BackupEntry]) -> Vec<&'a str> {
        selected.iter().map(|entry| entry.id()).collect()
    }

    #[rstest]
    #[case(3, &[])]
    #[case(2, &["f1"])]
    #[case(1, &["f1", "f2"])]
    fn test_evicts_oldest_full_backups(#[case] max: usize, #[case] expected: &[&str]) {
        let entries = entries(&[("f1", None), ("f2", None), ("f3", None)]);
        assert_eq!(ids(&select_evictions(&entries, max, "f3")), expected);
    }

    #[test]
    fn test_eviction_cascades_to_dependents() {
        let entries = entries(&[("f1", None), ("i1", Some("f1")), ("i2", Some("i1")), ("f2", None), ("i3", Some("f2"))]);
        assert_eq!(ids(&select_evictions(&entries, 4, "i3")), ["f1", "i1", "i2"]);
    }

    #[test]
    fn test_kept_backup_is_never_evicted() {
        let entries = entries(&[("f1", None), ("f2", None)]);
        assert_eq!(ids(&select_evictions(&entries, 0, "f1")), ["f2"]);
    }

    #[test]
    fn test_chain_of_kept_backup_is_never_evicted() {
        let entries = entries(&[("f1", None), ("i1", Some("f1")), ("i2", Some("i1"))]);
        assert!(select_evictions(&entries, 1, "i2").is_empty());
    }

    #[test]
    fn test_backup_ids_are_unique_and_ordered_by_time() {
        let now = OffsetDateTime::now_utc();
        let a = new_backup_id(now);
        let b = new_backup_id(now);
        assert_ne!(a, b);
        assert!(a.starts_with(&now.unix_timestamp().to_string()));
    }
}
