//! Where backup files live.
//!
//! Backup files are written once and never modified, so the
//! [`StorageBackend`] trait is a small CRUD surface with one hard guarantee:
//! [`write`](StorageBackend::write) is atomic. A reader either sees the
//! complete file or no file at all.

pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
