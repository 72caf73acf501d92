//! Fixtures shared by the unit tests.

use strongbox_compress::Compression;
use strongbox_crypto::KdfParams;
use strongbox_models::{
    BackupData, BackupMetadata, Comic, ComicFile, DeviceInfo, FORMAT_VERSION, ReadingStats, User,
};
use time::OffsetDateTime;

/// Argon2 is deliberately slow; tests do not need it to be.
pub(crate) const CHEAP_KDF: KdfParams = KdfParams { memory_kib: 64, iterations: 1, parallelism: 1 };

pub(crate) fn comic(id: &str) -> Comic {
    Comic {
        id: id.to_string(),
        title: format!("Comic {id}"),
        series: Some("Saga".to_string()),
        issue: Some(1),
        authors: vec!["Brian K. Vaughan".to_string()],
        file: None,
        page_count: 32,
        current_page: 0,
        favorite: false,
        tags: vec![],
        added_at: OffsetDateTime::UNIX_EPOCH,
        last_read_at: None,
    }
}

pub(crate) fn comic_with_file(id: &str, size: u64) -> Comic {
    Comic {
        file: Some(ComicFile {
            path: format!("library/{id}.cbz"),
            size,
            content_hash: format!("hash-{id}"),
            mime_type: "application/vnd.comicbook+zip".to_string(),
            modified_at: OffsetDateTime::UNIX_EPOCH,
        }),
        ..comic(id)
    }
}

pub(crate) fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        name: format!("Reader {id}"),
        email: None,
        created_at: OffsetDateTime::UNIX_EPOCH,
        preferences: Default::default(),
    }
}

pub(crate) fn session(id: &str, pages_read: u32) -> ReadingStats {
    ReadingStats {
        id: id.to_string(),
        comic_id: "c1".to_string(),
        user_id: "u1".to_string(),
        pages_read,
        seconds_spent: u64::from(pages_read) * 45,
        session_started_at: OffsetDateTime::UNIX_EPOCH,
        completed: false,
    }
}

pub(crate) fn snapshot(comics: Vec<Comic>, users: Vec<User>) -> BackupData {
    BackupData { comics, users, ..Default::default() }
}

pub(crate) fn metadata(id: &str, parent: Option<&str>) -> BackupMetadata {
    BackupMetadata {
        id: id.to_string(),
        version: FORMAT_VERSION,
        created_at: OffsetDateTime::UNIX_EPOCH,
        is_incremental: parent.is_some(),
        parent_backup_id: parent.map(str::to_string),
        chain_depth: u32::from(parent.is_some()),
        original_size: 0,
        compressed_size: 0,
        compression: Compression::None,
        compressed: false,
        deduplicated: false,
        compression_ratio: 1.0,
        checksum: String::new(),
        kdf: CHEAP_KDF,
        device: DeviceInfo::current(None),
        app_version: "test".to_string(),
    }
}
