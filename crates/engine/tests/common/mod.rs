#![allow(dead_code)]

use std::sync::Arc;
use strongbox_catalog::{Catalog, Database};
use strongbox_crypto::KdfParams;
use strongbox_engine::{Engine, EngineOptions};
use strongbox_models::{BackupData, Comic, ComicFile, ReadingStats, User};
use strongbox_storage::BackendHandle;
use strongbox_storage::backend::MockBackend;
use time::OffsetDateTime;

pub const PASSWORD: &str = "correct horse battery staple";

pub struct Harness {
    pub engine: Engine,
    pub storage: Arc<MockBackend>,
    pub catalog: Catalog,
}

pub fn options() -> EngineOptions {
    EngineOptions { kdf: KdfParams { memory_kib: 64, iterations: 1, parallelism: 1 }, ..EngineOptions::default() }
}

pub async fn harness(options: EngineOptions) -> Harness {
    let storage = Arc::new(MockBackend::default());
    let database = Database::connect_in_memory().await.unwrap();
    let catalog = Catalog::from(&database);
    let handle: BackendHandle = storage.clone();
    let engine = Engine::new(handle, catalog.clone(), options);
    Harness { engine, storage, catalog }
}

pub fn comic(id: &str) -> Comic {
    Comic {
        id: id.to_string(),
        title: format!("Comic {id}"),
        series: None,
        issue: None,
        authors: vec![],
        file: Some(ComicFile {
            path: format!("library/{id}.cbz"),
            size: 8192,
            content_hash: format!("hash-{id}"),
            mime_type: "application/vnd.comicbook+zip".to_string(),
            modified_at: OffsetDateTime::UNIX_EPOCH,
        }),
        page_count: 24,
        current_page: 0,
        favorite: false,
        tags: vec![],
        added_at: OffsetDateTime::UNIX_EPOCH,
        last_read_at: None,
    }
}

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        name: format!("Reader {id}"),
        email: None,
        created_at: OffsetDateTime::UNIX_EPOCH,
        preferences: Default::default(),
    }
}

pub fn session(id: &str, comic_id: &str) -> ReadingStats {
    ReadingStats {
        id: id.to_string(),
        comic_id: comic_id.to_string(),
        user_id: "u1".to_string(),
        pages_read: 12,
        seconds_spent: 600,
        session_started_at: OffsetDateTime::UNIX_EPOCH,
        completed: false,
    }
}

pub fn library(comics: &[&str], users: &[&str]) -> BackupData {
    BackupData {
        comics: comics.iter().map(|id| comic(id)).collect(),
        users: users.iter().map(|id| user(id)).collect(),
        ..Default::default()
    }
}
