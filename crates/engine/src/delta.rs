//! Differencing two snapshots and replaying the difference.
//!
//! [`calculate_delta`] never fails: records are matched by id through a hash
//! index (linear in the size of both snapshots) and compared by structural
//! equality. [`apply_delta`] is its inverse and fails only when the delta does
//! not fit the dataset it is applied to.

use crate::error::{ErrorKind, Result};
use std::collections::btree_map::{BTreeMap, Entry};
use std::collections::{HashMap, HashSet};
use strongbox_models::{
    BackupData, ComicFile, DeltaChanges, FileChange, FileChangeKind, Identified, SETTINGS_KEY, SettingsChange,
};

/// Added, modified and deleted records of one entity kind.
struct Partition<T> {
    added: Vec<T>,
    modified: Vec<T>,
    deleted: Vec<String>,
}

fn partition<T: Identified + Clone + PartialEq>(old: &[T], new: &[T]) -> Partition<T> {
    let old_by_id: HashMap<&str, &T> = old.iter().map(|record| (record.id(), record)).collect();
    let new_ids: HashSet<&str> = new.iter().map(Identified::id).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for record in new {
        match old_by_id.get(record.id()) {
            None => added.push(record.clone()),
            Some(previous) if *previous != record => modified.push(record.clone()),
            Some(_) => (),
        }
    }
    let deleted = old
        .iter()
        .filter(|record| !new_ids.contains(record.id()))
        .map(|record| record.id().to_string())
        .collect();
    Partition { added, modified, deleted }
}

fn files(data: &BackupData) -> impl Iterator<Item = &ComicFile> {
    data.comics.iter().filter_map(|comic| comic.file.as_ref())
}

fn file_changes(old: &BackupData, new: &BackupData) -> Vec<FileChange> {
    let old_by_path: HashMap<&str, &ComicFile> = files(old).map(|file| (file.path.as_str(), file)).collect();
    let new_paths: HashSet<&str> = files(new).map(|file| file.path.as_str()).collect();

    let mut changes: Vec<FileChange> = files(new)
        .filter_map(|file| match old_by_path.get(file.path.as_str()) {
            None => Some(FileChange::new(FileChangeKind::Added, file)),
            Some(previous) if *previous != file => Some(FileChange::new(FileChangeKind::Modified, file)),
            Some(_) => None,
        })
        .collect();
    changes.extend(
        files(old)
            .filter(|file| !new_paths.contains(file.path.as_str()))
            .map(|file| FileChange::new(FileChangeKind::Deleted, file)),
    );
    changes
}

/// Compute the changes that turn `old` into `new`.
///
/// Without an `old` snapshot the result is the full-backup delta, where every
/// record of `new` is added.
///
/// ```
/// use strongbox_engine::delta::calculate_delta;
/// use strongbox_models::BackupData;
///
/// let data = BackupData::default();
/// assert!(calculate_delta(Some(&data), &data).is_empty());
/// ```
pub fn calculate_delta(old: Option<&BackupData>, new: &BackupData) -> DeltaChanges {
    let Some(old) = old else {
        return DeltaChanges::full(new);
    };
    let comics = partition(&old.comics, &new.comics);
    let users = partition(&old.users, &new.users);
    let stats = partition(&old.stats, &new.stats);
    let settings_changes = match old.settings == new.settings {
        true => Vec::new(),
        false => vec![SettingsChange {
            key: SETTINGS_KEY.to_string(),
            old_value: Some(old.settings.clone()),
            new_value: new.settings.clone(),
        }],
    };
    DeltaChanges {
        added_comics: comics.added,
        modified_comics: comics.modified,
        deleted_comics: comics.deleted,
        added_users: users.added,
        modified_users: users.modified,
        deleted_users: users.deleted,
        added_stats: stats.added,
        modified_stats: stats.modified,
        deleted_stats: stats.deleted,
        settings_changes,
        file_changes: file_changes(old, new),
    }
}

fn replay<T: Identified + Clone>(
    kind: &str,
    records: Vec<T>,
    added: &[T],
    modified: &[T],
    deleted: &[String],
) -> Result<Vec<T>> {
    let mut by_id: BTreeMap<String, T> = records.into_iter().map(|record| (record.id().to_string(), record)).collect();
    for record in added {
        match by_id.entry(record.id().to_string()) {
            Entry::Occupied(_) => {
                exn::bail!(ErrorKind::corrupt(format!("{kind} {} is added but already present", record.id())))
            },
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            },
        }
    }
    for record in modified {
        let Some(slot) = by_id.get_mut(record.id()) else {
            exn::bail!(ErrorKind::corrupt(format!("{kind} {} is modified but not present", record.id())));
        };
        *slot = record.clone();
    }
    for id in deleted {
        // Deleting an absent record is a no-op.
        by_id.remove(id);
    }
    Ok(by_id.into_values().collect())
}

/// Apply `delta` onto `base`.
///
/// Added records must not exist yet and modified records must exist, otherwise
/// the delta was not computed against `base` and
/// [`ErrorKind::CorruptBackup`] is returned. Deleting an absent record is
/// tolerated. Collections in the result are sorted by id.
pub fn apply_delta(base: BackupData, delta: &DeltaChanges) -> Result<BackupData> {
    let BackupData { comics, users, mut settings, stats } = base;
    let comics = replay("comic", comics, &delta.added_comics, &delta.modified_comics, &delta.deleted_comics)?;
    let users = replay("user", users, &delta.added_users, &delta.modified_users, &delta.deleted_users)?;
    let stats = replay("reading session", stats, &delta.added_stats, &delta.modified_stats, &delta.deleted_stats)?;
    for change in &delta.settings_changes {
        if change.key == SETTINGS_KEY {
            settings = change.new_value.clone();
        } else {
            tracing::debug!(key = %change.key, "ignoring unknown settings key");
        }
    }
    Ok(BackupData { comics, users, settings, stats })
}
