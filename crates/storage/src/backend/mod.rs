//! Where backup files are kept.
//!
//! [`LocalBackend`] stores them under a directory on disk; [`MockBackend`]
//! (behind the `mock` feature) keeps them in memory for tests.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use std::path::Path;

/// A flat store of backup files addressed by path relative to a root.
///
/// Every method runs its path through [`validate_path`](crate::validate_path)
/// first; paths that fail are rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath). Methods that need
/// the file to exist return [`NotFound`](crate::error::ErrorKind::NotFound)
/// when it does not.
///
/// ```
/// use std::path::Path;
/// use strongbox_storage::{backend::StorageBackend, error::Result};
///
/// async fn backup_size(backend: &dyn StorageBackend, path: &Path) -> Result<Option<u64>> {
///     match backend.exists(path).await? {
///         true => Ok(Some(backend.stat(path).await?.size)),
///         false => Ok(None),
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Used in logs.
    fn name(&self) -> &str;

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Read at most `bytes` from the start of the file, for parsing a
    /// backup's clear-text header without loading the payload.
    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>>;

    /// Create or replace a file, creating parent directories as needed.
    ///
    /// All or nothing: readers see the old state or the complete new file,
    /// and a write that fails or is abandoned leaves nothing behind.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Like [`write`](Self::write), but never replaces a file: if `path`
    /// exists, or is created concurrently, this fails with
    /// [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists) and the
    /// existing file is left as it was.
    async fn create(&self, path: &Path, data: &[u8]) -> Result<()>;

    async fn delete(&self, path: &Path) -> Result<()>;

    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
