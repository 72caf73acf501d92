use std::path::PathBuf;
use time::OffsetDateTime;

/// What a backend knows about a stored file without reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative to the storage root.
    pub path: PathBuf,
    pub size: u64,
    pub modified: OffsetDateTime,
}
