use crate::records::{Comic, Identified, ReaderSettings, ReadingStats, User};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A full logical snapshot of the application's data.
///
/// Collection order carries no meaning. Use [`normalized`](Self::normalized)
/// before comparing two snapshots for equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupData {
    pub comics: Vec<Comic>,
    pub users: Vec<User>,
    pub settings: ReaderSettings,
    pub stats: Vec<ReadingStats>,
}

fn sort_by_id<T: Identified>(records: &mut [T]) {
    records.sort_by(|a, b| a.id().cmp(b.id()));
}

fn first_repeat<T: Identified>(records: &[T]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(records.len());
    records.iter().map(Identified::id).find(|id| !seen.insert(*id))
}

impl BackupData {
    /// Sort every collection by id, giving a canonical form.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        sort_by_id(&mut self.comics);
        sort_by_id(&mut self.users);
        sort_by_id(&mut self.stats);
        self
    }

    /// The first id shared by two records of the same kind, with the kind's
    /// name. Such a snapshot has no well-defined delta.
    pub fn duplicate_id(&self) -> Option<(&'static str, &str)> {
        first_repeat(&self.comics)
            .map(|id| ("comic", id))
            .or_else(|| first_repeat(&self.users).map(|id| ("user", id)))
            .or_else(|| first_repeat(&self.stats).map(|id| ("reading session", id)))
    }

    pub fn record_count(&self) -> usize {
        self.comics.len() + self.users.len() + self.stats.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: id.to_uppercase(),
            email: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            preferences: Default::default(),
        }
    }

    #[test]
    fn test_normalized_ignores_collection_order() {
        let a = BackupData { users: vec![user("u2"), user("u1")], ..Default::default() };
        let b = BackupData { users: vec![user("u1"), user("u2")], ..Default::default() };
        assert_ne!(a, b);
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn test_duplicate_id() {
        let unique = BackupData { users: vec![user("u1"), user("u2")], ..Default::default() };
        assert_eq!(unique.duplicate_id(), None);
        let repeated = BackupData { users: vec![user("u1"), user("u2"), user("u1")], ..Default::default() };
        assert_eq!(repeated.duplicate_id(), Some(("user", "u1")));
    }

    #[test]
    fn test_empty_snapshot_deserializes() {
        let data: BackupData = serde_json::from_str("{}").unwrap();
        assert_eq!(data.record_count(), 0);
        assert_eq!(data.settings, ReaderSettings::default());
    }
}
