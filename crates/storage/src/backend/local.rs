use crate::error::{ErrorKind, Result};
use crate::path::{TEMP_PREFIX, validate as validate_path};
use crate::{FileInfo, StorageBackend};
use async_trait::async_trait;
use exn::ResultExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::instrument;

/// Backup files in a directory on the local filesystem.
///
/// ```no_run
/// use strongbox_storage::backend::LocalBackend;
///
/// # fn example() -> strongbox_storage::error::Result<()> {
/// let backend = LocalBackend::new("local", "/var/lib/strongbox/backups")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}

impl LocalBackend {
    /// Use `root`, which must be absolute, creating it if it does not exist.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_absolute() || (root.exists() && !root.is_dir()) {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        // Once, at start-up; not worth an async constructor.
        std::fs::create_dir_all(&root).map_err(|err| ErrorKind::from_io(err, &root))?;
        Ok(Self { name: name.into(), root })
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path)?))
    }

    async fn store(&self, path: &Path, data: &[u8], replace: bool) -> Result<()> {
        let absolute = self.resolve(path)?;
        if let Some(directory) = absolute.parent() {
            fs::create_dir_all(directory).await.map_err(|err| ErrorKind::from_io(err, path))?;
        }
        let data = data.to_vec();
        // A blocking task runs to completion even if this future is dropped.
        tokio::task::spawn_blocking(move || Self::write_atomic(&absolute, &data, replace))
            .await
            .or_raise(|| ErrorKind::BackendError("write task panicked".to_string()))?
            .map_err(|err| ErrorKind::from_io(err, path))?;
        Ok(())
    }

    /// Write into a temporary sibling of `target`, flush it to disk and
    /// rename it into place. Dropping the temporary file before the rename
    /// deletes it. Without `replace`, an existing `target` fails the rename
    /// with `AlreadyExists`.
    fn write_atomic(target: &Path, data: &[u8], replace: bool) -> std::io::Result<()> {
        let directory = target.parent().unwrap_or(Path::new("."));
        let mut staged = tempfile::Builder::new().prefix(TEMP_PREFIX).suffix(".tmp").tempfile_in(directory)?;
        staged.write_all(data)?;
        staged.as_file().sync_all()?;
        match replace {
            true => staged.persist(target).map_err(|err| err.error)?,
            false => staged.persist_noclobber(target).map_err(|err| err.error)?,
        };
        // The rename itself is only durable once the directory is synced.
        #[cfg(unix)]
        std::fs::File::open(directory)?.sync_all()?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let absolute = self.resolve(path)?;
        Ok(fs::try_exists(&absolute).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let absolute = self.resolve(path)?;
        Ok(fs::read(&absolute).await.map_err(|err| ErrorKind::from_io(err, path))?)
    }

    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>> {
        let absolute = self.resolve(path)?;
        let file = fs::File::open(&absolute).await.map_err(|err| ErrorKind::from_io(err, path))?;
        let mut head = Vec::with_capacity(bytes.min(64 * 1024));
        file.take(bytes as u64).read_to_end(&mut head).await.map_err(ErrorKind::Io)?;
        Ok(head)
    }

    #[instrument(skip(self, data), fields(backend = %self.name, size = data.len()))]
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.store(path, data, true).await
    }

    #[instrument(skip(self, data), fields(backend = %self.name, size = data.len()))]
    async fn create(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.store(path, data, false).await
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let absolute = self.resolve(path)?;
        Ok(fs::remove_file(&absolute).await.map_err(|err| ErrorKind::from_io(err, path))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let absolute = self.resolve(path)?;
        let metadata = fs::metadata(&absolute).await.map_err(|err| ErrorKind::from_io(err, path))?;
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo { path: validate_path(path)?, size: metadata.len(), modified: modified.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend() -> (TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", dir.path()).unwrap();
        (dir, backend)
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_root_must_be_an_absolute_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("local", "relative/backups").is_err());

        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let err = LocalBackend::new("local", &file).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));

        let missing = dir.path().join("created/on/demand");
        LocalBackend::new("local", &missing).unwrap();
        assert!(missing.is_dir());
    }

    #[tokio::test]
    async fn test_write_read_delete() {
        let (dir, backend) = backend();
        let path = Path::new("2026/10/17.sbx");
        backend.write(path, b"backup").await.unwrap();
        assert!(dir.path().join("2026/10/17.sbx").is_file());
        assert!(backend.exists(path).await.unwrap());
        assert_eq!(backend.read(path).await.unwrap(), b"backup");

        backend.delete(path).await.unwrap();
        assert!(!backend.exists(path).await.unwrap());
        let err = backend.delete(path).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_replacing_leaves_no_temporaries() {
        let (dir, backend) = backend();
        backend.write(Path::new("full.sbx"), b"first").await.unwrap();
        backend.write(Path::new("full.sbx"), b"second").await.unwrap();
        assert_eq!(backend.read(Path::new("full.sbx")).await.unwrap(), b"second");
        assert_eq!(entries(dir.path()), ["full.sbx"]);
    }

    #[tokio::test]
    async fn test_create_never_replaces() {
        let (dir, backend) = backend();
        backend.create(Path::new("2026/full.sbx"), b"first").await.unwrap();
        let err = backend.create(Path::new("2026/full.sbx"), b"second").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        assert_eq!(backend.read(Path::new("2026/full.sbx")).await.unwrap(), b"first");
        assert_eq!(entries(&dir.path().join("2026")), ["full.sbx"]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing() {
        let (dir, backend) = backend();
        // A directory where the file should go makes the rename fail.
        std::fs::create_dir(dir.path().join("taken.sbx")).unwrap();
        assert!(backend.write(Path::new("taken.sbx"), b"data").await.is_err());
        assert_eq!(entries(dir.path()), ["taken.sbx"]);
    }

    #[tokio::test]
    async fn test_read_head() {
        let (_dir, backend) = backend();
        backend.write(Path::new("full.sbx"), b"\0\0\0\x02{}payload").await.unwrap();
        assert_eq!(backend.read_head(Path::new("full.sbx"), 4).await.unwrap(), b"\0\0\0\x02");
        assert_eq!(backend.read_head(Path::new("full.sbx"), 1024).await.unwrap().len(), 13);
        let err = backend.read_head(Path::new("missing.sbx"), 4).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat() {
        let (_dir, backend) = backend();
        backend.write(Path::new("./2026//full.sbx"), b"backup").await.unwrap();
        let info = backend.stat(Path::new("2026/full.sbx")).await.unwrap();
        assert_eq!(info.path, Path::new("2026/full.sbx"));
        assert_eq!(info.size, 6);
    }

    #[tokio::test]
    async fn test_paths_stay_under_root() {
        let (_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("2026/../../escape.sbx"), b"x").await.is_err());
        assert!(backend.delete(Path::new("../../escape.sbx")).await.is_err());
        assert!(backend.exists(Path::new(".strongbox-abc.tmp")).await.is_err());
    }
}
