//! SQLite catalog of backup history.
//!
//! The catalog is the only place backup history is recorded. It is
//! independent of the backup file format: each row stores the file's path,
//! a copy of its clear-text metadata and the [`BackupData`] snapshot the
//! backup was taken from, so the next incremental backup can diff against it
//! without reading or decrypting any file.
//!
//! # Concurrency
//! Reads go straight to the connection pool. Writes (insert and delete) are
//! serialized through a single writer lock shared by every clone of a
//! [`Database`] and every [`Catalog`] built from it.
//!
//! [`BackupData`]: strongbox_models::BackupData

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::{BackupEntry, BackupRecord};
pub use crate::repo::Catalog;
