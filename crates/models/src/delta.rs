use crate::data::BackupData;
use crate::records::{Comic, ComicFile, ReaderSettings, ReadingStats, User};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Key under which the singleton [`ReaderSettings`] object is tracked.
pub const SETTINGS_KEY: &str = "reader_settings";

/// The set of changes between two snapshots.
///
/// The `deleted_*` lists only ever contain identifiers. A full backup is a
/// delta against nothing: every record is "added" and nothing is deleted (see
/// [`DeltaChanges::full`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaChanges {
    pub added_comics: Vec<Comic>,
    pub modified_comics: Vec<Comic>,
    pub deleted_comics: Vec<String>,
    pub added_users: Vec<User>,
    pub modified_users: Vec<User>,
    pub deleted_users: Vec<String>,
    pub added_stats: Vec<ReadingStats>,
    pub modified_stats: Vec<ReadingStats>,
    pub deleted_stats: Vec<String>,
    pub settings_changes: Vec<SettingsChange>,
    pub file_changes: Vec<FileChange>,
}

/// The reader settings changed between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsChange {
    pub key: String,
    /// `None` when there was no previous snapshot.
    pub old_value: Option<ReaderSettings>,
    pub new_value: ReaderSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A change to a comic archive referenced by the library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub kind: FileChangeKind,
    pub path: String,
    pub size: u64,
    pub content_hash: String,
    pub mime_type: String,
    #[serde(with = "time::serde::timestamp::nanoseconds")]
    pub modified_at: OffsetDateTime,
}

impl FileChange {
    pub fn new(kind: FileChangeKind, file: &ComicFile) -> Self {
        Self {
            kind,
            path: file.path.clone(),
            size: file.size,
            content_hash: file.content_hash.clone(),
            mime_type: file.mime_type.clone(),
            modified_at: file.modified_at,
        }
    }
}

impl DeltaChanges {
    /// The delta that materializes `data` from an empty dataset.
    pub fn full(data: &BackupData) -> Self {
        let file_changes = data
            .comics
            .iter()
            .filter_map(|comic| comic.file.as_ref())
            .map(|file| FileChange::new(FileChangeKind::Added, file))
            .collect();
        Self {
            added_comics: data.comics.clone(),
            added_users: data.users.clone(),
            added_stats: data.stats.clone(),
            settings_changes: vec![SettingsChange {
                key: SETTINGS_KEY.to_string(),
                old_value: None,
                new_value: data.settings.clone(),
            }],
            file_changes,
            ..Default::default()
        }
    }

    /// Number of record-level changes (added + modified + deleted), plus one
    /// per settings change.
    pub fn change_count(&self) -> usize {
        self.added_comics.len()
            + self.modified_comics.len()
            + self.deleted_comics.len()
            + self.added_users.len()
            + self.modified_users.len()
            + self.deleted_users.len()
            + self.added_stats.len()
            + self.modified_stats.len()
            + self.deleted_stats.len()
            + self.settings_changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_count() == 0 && self.file_changes.is_empty()
    }
}
