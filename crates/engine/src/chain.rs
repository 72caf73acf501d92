//! Materializing the full dataset behind an incremental backup.
//!
//! Ancestors are located through the catalog and read from storage, newest
//! first, until a full backup is reached. The walk is iterative and bounded by
//! the number of catalog entries; a repeated id is a cycle and fails the walk.

use crate::container::{BackupContainer, BackupFile};
use crate::delta::apply_delta;
use crate::error::{ErrorKind, Result};
use crate::phase::Tracker;
use exn::ResultExt;
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use strongbox_catalog::{BackupEntry, Catalog};
use strongbox_models::{BackupData, BackupMetadata};
use strongbox_storage::BackendHandle;
use strongbox_storage::error::ErrorKind as StorageErrorKind;
use tracing::instrument;

/// The parent a backup depends on, if any.
fn parent_of(metadata: &BackupMetadata) -> Result<Option<String>> {
    match (metadata.is_incremental, &metadata.parent_backup_id) {
        (false, _) => Ok(None),
        (true, Some(parent)) => Ok(Some(parent.clone())),
        (true, None) => exn::bail!(ErrorKind::corrupt(format!("incremental backup {} has no parent", metadata.id))),
    }
}

type Ancestor = (BackupMetadata, BackupContainer);

async fn read_ancestor(storage: &BackendHandle, entry: &BackupEntry, password: &str) -> Result<Ancestor> {
    let id = entry.id().to_string();
    let bytes = match storage.read(&entry.path).await {
        Ok(bytes) => bytes,
        Err(err) if matches!(err.deref(), StorageErrorKind::NotFound(_)) => {
            return Err(err).or_raise(|| ErrorKind::BrokenChain(format!("backup file of {id} is missing")));
        },
        Err(err) => return Err(err).or_raise(|| ErrorKind::IoFailure),
    };
    let password = password.to_string();
    crate::blocking(move || {
        let file = BackupFile::decode(bytes)?;
        if file.metadata.id != id {
            exn::bail!(ErrorKind::corrupt(format!("file recorded for {id} holds backup {}", file.metadata.id)));
        }
        let container = file.open(&password)?;
        Ok((file.metadata, container))
    })
    .await
}

/// Read every ancestor of `target`, oldest (the full backup) first.
#[instrument(skip_all, fields(id = %target.id))]
pub(crate) async fn load_ancestors(
    storage: &BackendHandle,
    catalog: &Catalog,
    password: &str,
    target: &BackupMetadata,
    tracker: &Tracker,
) -> Result<Vec<BackupContainer>> {
    let Some(mut next) = parent_of(target)? else {
        return Ok(Vec::new());
    };
    let entries: HashMap<String, BackupEntry> = catalog
        .list_entries()
        .await
        .or_raise(|| ErrorKind::IoFailure)?
        .into_iter()
        .map(|entry| (entry.id().to_string(), entry))
        .collect();

    let mut visited = HashSet::from([target.id.clone()]);
    let mut ancestors = Vec::new();
    loop {
        tracker.check()?;
        if !visited.insert(next.clone()) {
            exn::bail!(ErrorKind::corrupt(format!("backup chain loops back to {next}")));
        }
        let entry = entries
            .get(&next)
            .ok_or_else(|| exn::Exn::from(ErrorKind::BrokenChain(format!("backup {next} is not in the catalog"))))?;
        let (metadata, container) = read_ancestor(storage, entry, password).await?;
        tracing::debug!(ancestor = %metadata.id, incremental = metadata.is_incremental, "loaded ancestor");
        ancestors.push(container);
        match parent_of(&metadata)? {
            Some(parent) => next = parent,
            None => break,
        }
    }
    ancestors.reverse();
    Ok(ancestors)
}

/// Replay `deltas` in order onto an empty dataset.
pub fn reconstruct<'a>(deltas: impl IntoIterator<Item = &'a BackupContainer>) -> Result<BackupData> {
    deltas.into_iter().try_fold(BackupData::default(), |data, container| apply_delta(data, &container.delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::calculate_delta;
    use crate::test_support::{comic, metadata, snapshot, user};
    use std::collections::BTreeMap;
    use strongbox_models::DeltaChanges;

    #[test]
    fn test_full_backup_has_no_parent() {
        assert_eq!(parent_of(&metadata("b1", None)).unwrap(), None);
    }

    #[test]
    fn test_incremental_without_parent_is_corrupt() {
        let mut metadata = metadata("b2", None);
        metadata.is_incremental = true;
        let err = parent_of(&metadata).unwrap_err();
        assert!(matches!(&*err, ErrorKind::CorruptBackup(_)));
    }

    #[test]
    fn test_reconstruct_equals_last_snapshot() {
        let s0 = snapshot(vec![comic("c1"), comic("c2")], vec![user("u1")]);
        let mut c1 = comic("c1");
        c1.favorite = true;
        let s1 = snapshot(vec![c1.clone(), comic("c2"), comic("c3")], vec![user("u1")]);
        let s2 = snapshot(vec![c1, comic("c3")], vec![user("u1"), user("u2")]);

        let links = [
            BackupContainer::new("b0", calculate_delta(None, &s0), BTreeMap::new()),
            BackupContainer::new("b1", calculate_delta(Some(&s0), &s1), BTreeMap::new()),
            BackupContainer::new("b2", calculate_delta(Some(&s1), &s2), BTreeMap::new()),
        ];
        assert_eq!(reconstruct(&links).unwrap(), s2.normalized());
    }

    #[test]
    fn test_reconstruct_out_of_order_is_corrupt() {
        let s0 = snapshot(vec![comic("c1")], vec![]);
        let links = [
            BackupContainer::new("b0", DeltaChanges::full(&s0), BTreeMap::new()),
            BackupContainer::new("b0-again", DeltaChanges::full(&s0), BTreeMap::new()),
        ];
        let err = reconstruct(&links).unwrap_err();
        assert!(matches!(&*err, ErrorKind::CorruptBackup(_)));
    }
}
