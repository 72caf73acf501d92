//! Values exchanged between the strongbox crates and the host application.
//!
//! [`BackupData`] is what the application's data store hands over and gets
//! back; [`DeltaChanges`] is what a backup file actually stores; and
//! [`BackupMetadata`] is the clear-text header describing it.

mod data;
mod delta;
mod metadata;
mod records;

pub use crate::data::BackupData;
pub use crate::delta::{DeltaChanges, FileChange, FileChangeKind, SETTINGS_KEY, SettingsChange};
pub use crate::metadata::{BackupMetadata, DeviceInfo, FORMAT_VERSION};
pub use crate::records::{
    Comic, ComicFile, Dated, Identified, PageLayout, ReaderSettings, ReadingDirection, ReadingStats, User,
};
