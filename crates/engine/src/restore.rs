//! Restoring a backup, in full or selectively.

use crate::chain::{load_ancestors, reconstruct};
use crate::container::{BackupContainer, BackupFile};
use crate::error::{ErrorKind, Result};
use crate::phase::{Phase, Tracker};
use crate::{Engine, blocking};
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};
use strongbox_models::{BackupData, BackupMetadata, Dated, Identified};
use time::OffsetDateTime;
use tracing::instrument;

/// The kinds of record a restore can be limited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Comics,
    Users,
    Settings,
    Stats,
}

/// What to restore.
///
/// The default restores everything. Filters combine: a record is restored
/// only if it passes every filter that is set. The reader settings have no id
/// and no date, so they are restored when [`Settings`](EntityKind::Settings)
/// is named explicitly, or when no filter is set at all.
///
/// ```
/// use strongbox_engine::{EntityKind, RestoreOptions};
///
/// let options = RestoreOptions::default().only([EntityKind::Comics]).with_ids(["c1", "c7"]);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Empty means every kind.
    pub kinds: BTreeSet<EntityKind>,
    /// Empty means every id.
    pub ids: BTreeSet<String>,
    /// Inclusive lower bound on a record's primary date.
    pub from: Option<OffsetDateTime>,
    /// Inclusive upper bound on a record's primary date.
    pub to: Option<OffsetDateTime>,
    /// Passed to the [`RestoreTarget`]: replace records that already exist
    /// there instead of keeping them.
    pub overwrite_existing: bool,
}

impl RestoreOptions {
    #[must_use]
    pub fn only(mut self, kinds: impl IntoIterator<Item = EntityKind>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    #[must_use]
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ids.extend(ids.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn between(mut self, from: Option<OffsetDateTime>, to: Option<OffsetDateTime>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    #[must_use]
    pub fn overwrite(mut self, overwrite_existing: bool) -> Self {
        self.overwrite_existing = overwrite_existing;
        self
    }

    fn has_record_filter(&self) -> bool {
        !self.ids.is_empty() || self.from.is_some() || self.to.is_some()
    }

    fn includes(&self, kind: EntityKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    /// Reject combinations that can never select anything.
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from > to
        {
            exn::bail!(ErrorKind::invalid(format!("date range starts ({from}) after it ends ({to})")));
        }
        if self.ids.iter().any(String::is_empty) {
            exn::bail!(ErrorKind::invalid("record ids must not be empty"));
        }
        let settings_only = self.kinds.len() == 1 && self.kinds.contains(&EntityKind::Settings);
        if settings_only && self.has_record_filter() {
            exn::bail!(ErrorKind::invalid("reader settings cannot be selected by id or date"));
        }
        Ok(())
    }

    fn keep<T: Identified + Dated>(&self, record: &T) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(record.id()) {
            return false;
        }
        let date = record.date();
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }

    fn select<T: Identified + Dated>(&self, kind: EntityKind, records: Vec<T>) -> Vec<T> {
        match self.includes(kind) {
            true => records.into_iter().filter(|record| self.keep(record)).collect(),
            false => Vec::new(),
        }
    }

    fn restores_settings(&self) -> bool {
        self.kinds.contains(&EntityKind::Settings) || (self.kinds.is_empty() && !self.has_record_filter())
    }

    /// Apply the filters to a reconstructed dataset.
    pub fn filter(&self, data: BackupData) -> (BackupData, RestoreCounts) {
        let BackupData { comics, users, settings, stats } = data;
        let restores_settings = self.restores_settings();
        let data = BackupData {
            comics: self.select(EntityKind::Comics, comics),
            users: self.select(EntityKind::Users, users),
            // Left at default when not restored; see `RestoreCounts::settings`.
            settings: match restores_settings {
                true => settings,
                false => Default::default(),
            },
            stats: self.select(EntityKind::Stats, stats),
        };
        let counts = RestoreCounts {
            comics: data.comics.len(),
            users: data.users.len(),
            settings: restores_settings,
            stats: data.stats.len(),
        };
        (data, counts)
    }
}

/// How many records of each kind a restore selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreCounts {
    pub comics: usize,
    pub users: usize,
    /// Whether the reader settings were selected.
    pub settings: bool,
    pub stats: usize,
}

impl RestoreCounts {
    pub fn total(&self) -> usize {
        self.comics + self.users + self.stats + usize::from(self.settings)
    }
}

/// The outcome of a successful restore.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreSummary {
    pub metadata: BackupMetadata,
    /// Number of backup files read: 1 for a full backup, more along a chain.
    pub chain_length: usize,
    /// The selected records. `data.settings` is only meaningful when
    /// `counts.settings` is set.
    pub data: BackupData,
    pub counts: RestoreCounts,
    pub overwrite_existing: bool,
    pub duration: Duration,
}

/// The application's data store, receiving restored records.
#[async_trait]
pub trait RestoreTarget: Send + Sync {
    /// Write `restore.data` into the store, honouring
    /// `restore.overwrite_existing` and skipping the settings unless
    /// `restore.counts.settings` is set.
    async fn apply(&self, restore: &RestoreSummary) -> Result<()>;
}

impl Engine {
    /// Read, verify, decrypt and reconstruct `backup_file`, then apply
    /// `options` to the result.
    ///
    /// Nothing is written anywhere; use [`restore_into`](Self::restore_into)
    /// to hand the result to a [`RestoreTarget`].
    #[instrument(skip_all, fields(backup_file = %backup_file.as_ref().display()))]
    pub async fn restore_incremental_backup(
        &self,
        password: &str,
        backup_file: impl AsRef<Path>,
        options: &RestoreOptions,
    ) -> Result<RestoreSummary> {
        let tracker = self.tracker("restore");
        let result = self.restore(&tracker, password, backup_file.as_ref(), options).await;
        tracker.finish(result)
    }

    /// Like [`restore_incremental_backup`](Self::restore_incremental_backup),
    /// then apply the result to `target`.
    #[instrument(skip_all, fields(backup_file = %backup_file.as_ref().display()))]
    pub async fn restore_into(
        &self,
        password: &str,
        backup_file: impl AsRef<Path>,
        options: &RestoreOptions,
        target: &dyn RestoreTarget,
    ) -> Result<RestoreSummary> {
        let tracker = self.tracker("restore");
        let result = async {
            let summary = self.restore(&tracker, password, backup_file.as_ref(), options).await?;
            tracker.enter(Phase::Applying)?;
            target.apply(&summary).await?;
            Ok(summary)
        }
        .await;
        tracker.finish(result)
    }

    async fn restore(
        &self,
        tracker: &Tracker,
        password: &str,
        backup_file: &Path,
        options: &RestoreOptions,
    ) -> Result<RestoreSummary> {
        let started = Instant::now();
        options.validate()?;
        if password.is_empty() {
            exn::bail!(ErrorKind::invalid("password must not be empty"));
        }

        tracker.enter(Phase::Reading)?;
        let bytes = self.storage.read(backup_file).await.or_raise(|| ErrorKind::IoFailure)?;
        let file = BackupFile::decode(bytes)?;

        tracker.enter(Phase::Verifying)?;
        file.verify()?;

        tracker.enter(Phase::Decrypting)?;
        let owned_password = password.to_string();
        let (file, plaintext) = blocking(move || {
            let plaintext = file.decrypt(&owned_password)?;
            Ok((file, plaintext))
        })
        .await?;

        tracker.enter(Phase::Decompressing)?;
        let (file, payload) = blocking(move || {
            let payload = file.decompress(plaintext)?;
            Ok((file, payload))
        })
        .await?;

        tracker.enter(Phase::Parsing)?;
        let container = BackupContainer::from_bytes(&payload, &file.metadata)?;
        let metadata = file.metadata;

        tracker.enter(Phase::Reconstructing)?;
        let mut chain = load_ancestors(&self.storage, &self.catalog, password, &metadata, tracker).await?;
        chain.push(container);
        let chain_length = chain.len();
        let data = blocking(move || reconstruct(&chain)).await?;

        tracker.enter(Phase::Filtering)?;
        let (data, counts) = options.filter(data);

        let summary = RestoreSummary {
            metadata,
            chain_length,
            data,
            counts,
            overwrite_existing: options.overwrite_existing,
            duration: started.elapsed(),
        };
        tracing::info!(
            id = %summary.metadata.id,
            chain_length,
            comics = counts.comics,
            users = counts.users,
            settings = counts.settings,
            stats = counts.stats,
            "restored backup"
        );
        Ok(summary)
    }
}
