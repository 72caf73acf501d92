//! Content-hash index over the records and files of a delta.
//!
//! The map is recorded in the backup container next to the delta. It is
//! advisory: restore does not consult it, and the bytes of comic archives are
//! owned by the application's data store. What it buys is accounting (how
//! much content in this backup is a repeat) and a stable index a blob store
//! could resolve against later.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use strongbox_crypto::hash_record;
use strongbox_models::{DeltaChanges, FileChangeKind, Identified};

/// Maps a content hash to the canonical identifier of that content.
///
/// The first record or file encountered with a given hash wins; later ones
/// with identical content are counted as duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupMap {
    entries: BTreeMap<String, String>,
    duplicates: usize,
    saved_bytes: u64,
}

impl DedupMap {
    /// Index the added records and the added or modified files of `delta`.
    ///
    /// Files of `min_file_size` bytes or less are skipped; they are cheaper to
    /// store inline than to track.
    pub fn build(delta: &DeltaChanges, min_file_size: u64) -> Result<Self> {
        let mut map = Self::default();
        map.index_records(&delta.added_comics)?;
        map.index_records(&delta.added_users)?;
        map.index_records(&delta.added_stats)?;
        for file in &delta.file_changes {
            if file.kind == FileChangeKind::Deleted || file.size <= min_file_size {
                continue;
            }
            if map.insert(&file.content_hash, &file.path) {
                map.saved_bytes += file.size;
            }
        }
        tracing::debug!(entries = map.len(), duplicates = map.duplicates, saved_bytes = map.saved_bytes, "deduplicated");
        Ok(map)
    }

    fn index_records<T: Identified + serde::Serialize>(&mut self, records: &[T]) -> Result<()> {
        for record in records {
            let hash = hash_record(record).or_raise(|| ErrorKind::invalid("record could not be hashed"))?;
            self.insert(&hash, record.id());
        }
        Ok(())
    }

    /// Returns `true` if `hash` was already indexed.
    fn insert(&mut self, hash: &str, id: &str) -> bool {
        match self.entries.entry(hash.to_string()) {
            Entry::Occupied(_) => {
                self.duplicates += 1;
                true
            },
            Entry::Vacant(slot) => {
                slot.insert(id.to_string());
                false
            },
        }
    }

    /// The canonical identifier recorded for `hash`.
    pub fn resolve(&self, hash: &str) -> Option<&str> {
        self.entries.get(hash).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of records and files whose content was already indexed.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Bytes of file content that did not need storing again.
    pub fn saved_bytes(&self) -> u64 {
        self.saved_bytes
    }

    pub fn into_entries(self) -> BTreeMap<String, String> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{comic, comic_with_file, snapshot, user};
    use rstest::rstest;
    use strongbox_models::{BackupData, FileChange};

    fn delta_with_files(sizes: &[(&str, u64, &str)]) -> DeltaChanges {
        let comics = sizes
            .iter()
            .map(|(id, size, hash)| {
                let mut comic = comic_with_file(id, *size);
                if let Some(file) = comic.file.as_mut() {
                    file.content_hash = hash.to_string();
                }
                comic
            })
            .collect();
        DeltaChanges::full(&snapshot(comics, vec![]))
    }

    #[test]
    fn test_records_are_indexed_by_content() {
        let data = snapshot(vec![comic("c1"), comic("c2")], vec![user("u1")]);
        let map = DedupMap::build(&DeltaChanges::full(&data), 1024).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.duplicates(), 0);
        let hash = hash_record(&comic("c2")).unwrap();
        assert_eq!(map.resolve(&hash), Some("c2"));
    }

    #[test]
    fn test_identical_files_map_to_first_path() {
        let delta = delta_with_files(&[("c1", 4096, "same"), ("c2", 4096, "same"), ("c3", 4096, "other")]);
        let map = DedupMap::build(&delta, 1024).unwrap();
        assert_eq!(map.resolve("same"), Some("library/c1.cbz"));
        assert_eq!(map.resolve("other"), Some("library/c3.cbz"));
        assert_eq!(map.duplicates(), 1);
        assert_eq!(map.saved_bytes(), 4096);
    }

    #[rstest]
    #[case(1024, false)]
    #[case(1025, true)]
    fn test_small_files_are_not_indexed(#[case] size: u64, #[case] indexed: bool) {
        let delta = delta_with_files(&[("c1", size, "tiny")]);
        let map = DedupMap::build(&delta, 1024).unwrap();
        assert_eq!(map.resolve("tiny").is_some(), indexed);
    }

    #[test]
    fn test_deleted_files_are_not_indexed() {
        let file = comic_with_file("c1", 4096).file.unwrap();
        let delta = DeltaChanges {
            file_changes: vec![FileChange::new(FileChangeKind::Deleted, &file)],
            ..Default::default()
        };
        assert!(DedupMap::build(&delta, 1024).unwrap().is_empty());
    }

    #[test]
    fn test_empty_delta() {
        let delta = DeltaChanges::full(&BackupData::default());
        let map = DedupMap::build(&delta, 1024).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.saved_bytes(), 0);
    }
}
