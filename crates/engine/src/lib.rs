//! Incremental, encrypted backups of a comic library.
//!
//! The [`Engine`] takes a [`BackupData`] snapshot from the application's data
//! store and writes it as a single backup file: the changes since the
//! previous backup ([`delta`]), indexed by content hash ([`dedup`]),
//! serialized, compressed, encrypted with a password and framed behind a
//! clear-text metadata header ([`container`]). The snapshot itself is kept
//! in the [catalog](strongbox_catalog) for the next diff.
//!
//! Restoring walks the chain of incremental backups back to the last full
//! one ([`chain`]), replays every delta and hands the (optionally filtered)
//! result back, or to a [`RestoreTarget`].
//!
//! ```no_run
//! use strongbox_config::Config;
//! use strongbox_engine::{Engine, RestoreOptions};
//! use strongbox_models::BackupData;
//!
//! # async fn example() -> strongbox_engine::error::Result<()> {
//! let engine = Engine::open(&Config::load(Some("strongbox.toml")).unwrap()).await?;
//! let summary = engine.create_incremental_backup(BackupData::default(), "hunter2", "2026/10/17.sbx", true, true).await?;
//! let restored = engine.restore_incremental_backup("hunter2", &summary.path, &RestoreOptions::default()).await?;
//! assert_eq!(restored.data, BackupData::default());
//! # Ok(())
//! # }
//! ```
//!
//! [`BackupData`]: strongbox_models::BackupData

mod backup;
pub mod chain;
pub mod container;
pub mod dedup;
pub mod delta;
mod engine;
pub mod error;
mod phase;
mod restore;
pub mod scheduler;
#[cfg(test)]
mod test_support;

pub use crate::backup::BackupSummary;
pub use crate::dedup::DedupMap;
pub use crate::engine::{Engine, EngineOptions};
pub use crate::phase::{Phase, ProgressSender};
pub use crate::restore::{EntityKind, RestoreCounts, RestoreOptions, RestoreSummary, RestoreTarget};

use crate::error::{ErrorKind, Result};
use exn::ResultExt;

/// Run CPU-bound work (diffing, compression, key derivation) off the async
/// worker threads.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.or_raise(|| ErrorKind::IoFailure)?
}
