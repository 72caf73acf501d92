//! Repository for backup history.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{BackupEntry, BackupRecord, BackupRow, EntryRow, NewBackupRow};
use exn::ResultExt;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|e| e.is_unique_violation())
}

/// Repository for [`BackupRecord`]s.
///
/// Records are ordered by insertion: "last" means most recently inserted, and
/// [`get_all_backups`](Self::get_all_backups) returns oldest first.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}
impl From<&Database> for Catalog {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), writer: db.writer() }
    }
}
impl Catalog {
    // =========================================================================
    // Insert
    // =========================================================================

    /// Record a new backup.
    ///
    /// Returns [`ErrorKind::Duplicate`] if a backup with the same id is
    /// already recorded.
    #[instrument(skip_all, fields(id = %record.id()))]
    pub async fn insert_backup(&self, record: &BackupRecord) -> Result<()> {
        let row = NewBackupRow::try_from(record)?;
        let _guard = self.writer.lock().await;
        let result = sqlx::query(include_str!("../queries/insert_backup.sql"))
            .bind(row.id.as_str())
            .bind(row.path)
            .bind(row.parent_id)
            .bind(row.is_incremental)
            .bind(row.chain_depth)
            .bind(row.metadata)
            .bind(row.snapshot)
            .bind(row.created_at)
            .execute(&self.pool)
            .await;
        match result {
            Err(e) if is_unique_violation(&e) => exn::bail!(ErrorKind::Duplicate(row.id)),
            result => result.or_raise(|| ErrorKind::Database)?,
        };
        Ok(())
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// The most recently recorded backup, if any.
    pub async fn get_last_backup(&self) -> Result<Option<BackupRecord>> {
        let row: Option<BackupRow> = sqlx::query_as(include_str!("../queries/get_last_backup.sql"))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(BackupRecord::try_from).transpose()
    }

    pub async fn get_backup(&self, id: impl AsRef<str>) -> Result<Option<BackupRecord>> {
        let row: Option<BackupRow> = sqlx::query_as(include_str!("../queries/get_backup.sql"))
            .bind(id.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(BackupRecord::try_from).transpose()
    }

    /// Every recorded backup with its snapshot, oldest first.
    pub async fn get_all_backups(&self) -> Result<Vec<BackupRecord>> {
        let rows: Vec<BackupRow> = sqlx::query_as(include_str!("../queries/get_all_backups.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(BackupRecord::try_from).collect()
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Every recorded backup without snapshots, oldest first.
    ///
    /// Cheaper than [`get_all_backups`](Self::get_all_backups) when only
    /// metadata is needed (listing, retention, chain walking).
    pub async fn list_entries(&self) -> Result<Vec<BackupEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/list_entries.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(BackupEntry::try_from).collect()
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_backups.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove a backup from the catalog. The backing file is not touched.
    ///
    /// Returns `true` if a record was deleted, `false` if `id` was not found.
    #[instrument(skip(self))]
    pub async fn delete_backup(&self, id: &str) -> Result<bool> {
        let _guard = self.writer.lock().await;
        let result = sqlx::query(include_str!("../queries/delete_backup.sql"))
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
