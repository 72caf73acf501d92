//! Storage path validation.

use crate::error::{ErrorKind, Result};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Name prefix of the temporary files behind atomic writes. No stored file
/// may use it, so an in-flight write can never be mistaken for a backup.
pub(crate) const TEMP_PREFIX: &str = ".strongbox-";

fn usable(name: &OsStr) -> bool {
    let bytes = name.as_encoded_bytes();
    // Null bytes pass through Path::components() on Unix.
    !bytes.contains(&0) && !bytes.starts_with(TEMP_PREFIX.as_bytes())
}

/// Normalize a path relative to the storage root, rejecting anything that
/// would leave the root or name nothing.
///
/// `.` and empty components are dropped and `..` is resolved lexically; a
/// `..` that would climb above the root is an error rather than being
/// clamped.
///
/// ```
/// use std::path::Path;
/// use strongbox_storage::validate_path;
///
/// assert_eq!(validate_path("2026//10/./full.sbx").unwrap(), Path::new("2026/10/full.sbx"));
/// assert_eq!(validate_path("/2026/old/../full.sbx").unwrap(), Path::new("2026/full.sbx"));
/// assert!(validate_path("2026/../../full.sbx").is_err());
/// assert!(validate_path("2026/.strongbox-a1b2.tmp").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let invalid = || exn::Exn::from(ErrorKind::InvalidPath(path.to_path_buf()));
    let mut normalized: Vec<&OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(name) if usable(name) => normalized.push(name),
            Component::Normal(_) | Component::Prefix(_) => return Err(invalid()),
            Component::ParentDir => {
                normalized.pop().ok_or_else(invalid)?;
            },
            Component::CurDir | Component::RootDir => (),
        }
    }
    if normalized.is_empty() {
        return Err(invalid());
    }
    Ok(normalized.into_iter().collect())
}
