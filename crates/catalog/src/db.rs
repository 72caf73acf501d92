use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::instrument;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Backups are rare; a handful of readers is plenty.
const MAX_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// An open catalog database, migrated to the current schema.
///
/// Clones share the connection pool and the writer lock.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl Database {
    /// Open (creating if needed) the catalog file at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::options()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        Self::open(options, MAX_CONNECTIONS).await
    }

    /// A private, empty catalog that lives as long as this value and its
    /// clones. Left public (not test-only) so other crates can test against
    /// it.
    pub async fn connect_in_memory() -> Result<Self> {
        // Every connection to ":memory:" is a separate database, so one
        // connection it is.
        Self::open(Self::options().filename(":memory:"), 1).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .foreign_keys(true)
            // A lost catalog row orphans a backup file; pay for the fsync.
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(BUSY_TIMEOUT)
            .pragma("temp_store", "memory")
    }

    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        tracing::debug!(connections, "catalog ready");
        Ok(Self { pool, writer: Arc::new(Mutex::new(())) })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn writer(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.writer)
    }

    /// Wait for outstanding queries, then close every connection.
    pub async fn close(&self) {
        // Best effort; refreshes query planner statistics.
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_catalog_is_migrated() {
        let db = Database::connect_in_memory().await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'backups'")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(tables, ["backups"]);
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_reopening_a_file_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.sqlite");
        let db = Database::connect(&path).await.unwrap();
        sqlx::query("INSERT INTO backups (id, path, is_incremental, chain_depth, metadata, snapshot, created_at) VALUES ('b1', 'b1.sbx', 0, 0, '{}', x'', 0)")
            .execute(db.pool())
            .await
            .unwrap();
        db.close().await;
        assert!(path.is_file());

        // Migrations have already run; running them again is a no-op.
        let db = Database::connect(&path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM backups").fetch_one(db.pool()).await.unwrap();
        assert_eq!(count, 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_durability_pragmas() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("catalog.sqlite")).await.unwrap();
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(db.pool()).await.unwrap();
        assert_eq!(mode, "wal");
        // FULL
        let synchronous: i64 = sqlx::query_scalar("PRAGMA synchronous").fetch_one(db.pool()).await.unwrap();
        assert_eq!(synchronous, 2);
        db.close().await;
    }

    #[tokio::test]
    async fn test_clones_share_writer_lock() {
        let db = Database::connect_in_memory().await.unwrap();
        let clone = db.clone();
        let _guard = db.writer.lock().await;
        assert!(clone.writer.try_lock().is_err());
    }
}
