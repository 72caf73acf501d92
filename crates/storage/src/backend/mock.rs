use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use crate::{FileInfo, StorageBackend};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Stored {
    data: Vec<u8>,
    modified: OffsetDateTime,
}

/// Backup files in memory, for tests.
///
/// Each write replaces a map entry under one lock, so writes are atomic.
/// [`fail_writes`](Self::fail_writes) simulates a full or failing disk.
///
/// ```
/// use std::path::Path;
/// use strongbox_storage::backend::{MockBackend, StorageBackend};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> strongbox_storage::error::Result<()> {
/// let backend = MockBackend::with_files([("2026/full.sbx", b"\0\0\0\x02{}".to_vec())]);
/// assert!(backend.exists(Path::new("2026/full.sbx")).await?);
///
/// backend.fail_writes(true);
/// assert!(backend.write(Path::new("2026/next.sbx"), b"...").await.is_err());
/// assert_eq!(backend.paths().await, [Path::new("2026/full.sbx")]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockBackend {
    files: RwLock<BTreeMap<PathBuf, Stored>>,
    fail_writes: AtomicBool,
}

impl MockBackend {
    /// Panics on an invalid path: a test with a broken fixture should not
    /// get as far as asserting anything.
    pub fn with_files<P: AsRef<Path>>(files: impl IntoIterator<Item = (P, Vec<u8>)>) -> Self {
        let modified = OffsetDateTime::now_utc();
        let files = files
            .into_iter()
            .map(|(path, data)| match validate_path(path.as_ref()) {
                Ok(path) => (path, Stored { data, modified }),
                Err(err) => panic!("invalid fixture path: {}", &*err),
            })
            .collect();
        Self { files: RwLock::new(files), fail_writes: AtomicBool::new(false) }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every stored path, sorted.
    pub async fn paths(&self) -> Vec<PathBuf> {
        self.files.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }

    fn prepare(&self, path: &Path, data: &[u8]) -> Result<(PathBuf, Stored)> {
        let path = validate_path(path)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::Io(std::io::Error::other("simulated write failure")));
        }
        Ok((path, Stored { data: data.to_vec(), modified: OffsetDateTime::now_utc() }))
    }

    async fn get(&self, path: &Path) -> Result<(PathBuf, Stored)> {
        let path = validate_path(path)?;
        match self.files.read().await.get(&path) {
            Some(stored) => Ok((path, stored.clone())),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::with_files(Vec::<(PathBuf, Vec<u8>)>::new())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.files.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(self.get(path).await?.1.data)
    }

    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>> {
        let mut data = self.get(path).await?.1.data;
        data.truncate(bytes);
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let (path, stored) = self.prepare(path, data)?;
        self.files.write().await.insert(path, stored);
        Ok(())
    }

    async fn create(&self, path: &Path, data: &[u8]) -> Result<()> {
        let (path, stored) = self.prepare(path, data)?;
        match self.files.write().await.entry(path) {
            Entry::Occupied(slot) => exn::bail!(ErrorKind::AlreadyExists(slot.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(stored);
                Ok(())
            },
        }
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        match self.files.write().await.remove(&path) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let (path, stored) = self.get(path).await?;
        Ok(FileInfo { path, size: stored.data.len() as u64, modified: stored.modified })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lifecycle() {
        let backend = MockBackend::default();
        let path = Path::new("2026/full.sbx");
        backend.write(path, b"backup").await.unwrap();
        assert_eq!(backend.read(path).await.unwrap(), b"backup");
        assert_eq!(backend.read_head(path, 3).await.unwrap(), b"bac");
        assert_eq!(backend.read_head(path, 100).await.unwrap(), b"backup");
        assert_eq!(backend.stat(path).await.unwrap().size, 6);

        backend.delete(path).await.unwrap();
        assert!(backend.is_empty().await);
        for err in [backend.read(path).await.unwrap_err(), backend.delete(path).await.unwrap_err()] {
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn test_paths_are_normalized() {
        let backend = MockBackend::with_files([("./b//2.sbx", vec![2]), ("a/1.sbx", vec![1])]);
        assert_eq!(backend.paths().await, [Path::new("a/1.sbx"), Path::new("b/2.sbx")]);
        assert!(backend.exists(Path::new("b/x/../2.sbx")).await.unwrap());
        assert!(backend.exists(Path::new("../a/1.sbx")).await.is_err());
    }

    #[tokio::test]
    async fn test_create_never_replaces() {
        let backend = MockBackend::with_files([("full.sbx", b"first".to_vec())]);
        let err = backend.create(Path::new("full.sbx"), b"second").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(path) if path == Path::new("full.sbx")));
        assert_eq!(backend.read(Path::new("full.sbx")).await.unwrap(), b"first");
        backend.create(Path::new("next.sbx"), b"second").await.unwrap();
        assert_eq!(backend.len().await, 2);
    }

    #[tokio::test]
    async fn test_failed_writes_store_nothing() {
        let backend = MockBackend::default();
        backend.fail_writes(true);
        let err = backend.write(Path::new("full.sbx"), b"data").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(backend.is_empty().await);

        backend.fail_writes(false);
        backend.write(Path::new("full.sbx"), b"data").await.unwrap();
        assert_eq!(backend.len().await, 1);
    }
}
