//! Records supplied by the application's primary data store.
//!
//! The engine treats these as opaque values: it only ever looks at their `id`
//! (and, for selective restore, their primary timestamp). Everything else is
//! compared by structural equality.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// A record that is diffed by identity.
pub trait Identified {
    fn id(&self) -> &str;
}

/// A record with a primary timestamp, used for date-range restores.
pub trait Dated {
    fn date(&self) -> OffsetDateTime;
}

/// A comic in the user's library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub issue: Option<u32>,
    #[serde(default)]
    pub authors: Vec<String>,
    /// The comic archive on disk, if the library tracks one.
    #[serde(default)]
    pub file: Option<ComicFile>,
    pub page_count: u32,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(with = "time::serde::timestamp::nanoseconds")]
    pub added_at: OffsetDateTime,
    #[serde(default, with = "time::serde::timestamp::nanoseconds::option")]
    pub last_read_at: Option<OffsetDateTime>,
}

/// Descriptor of a comic archive (CBZ, CBR, PDF...) held by the data store.
///
/// The bytes themselves never pass through the engine; the store hashes them
/// and the engine only records the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicFile {
    pub path: String,
    pub size: u64,
    /// BLAKE3 hash of the file contents.
    pub content_hash: String,
    pub mime_type: String,
    #[serde(with = "time::serde::timestamp::nanoseconds")]
    pub modified_at: OffsetDateTime,
}

/// A reader profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(with = "time::serde::timestamp::nanoseconds")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingDirection {
    #[default]
    LeftToRight,
    RightToLeft,
    Vertical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLayout {
    #[default]
    Single,
    Double,
    Continuous,
}

/// The singleton reader settings object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSettings {
    pub reading_direction: ReadingDirection,
    pub page_layout: PageLayout,
    pub zoom_percent: u16,
    pub theme: String,
    pub keep_screen_on: bool,
    pub auto_bookmark: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            reading_direction: ReadingDirection::default(),
            page_layout: PageLayout::default(),
            zoom_percent: 100,
            theme: "system".to_string(),
            keep_screen_on: false,
            auto_bookmark: true,
        }
    }
}

/// One reading session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingStats {
    pub id: String,
    pub comic_id: String,
    pub user_id: String,
    pub pages_read: u32,
    pub seconds_spent: u64,
    #[serde(with = "time::serde::timestamp::nanoseconds")]
    pub session_started_at: OffsetDateTime,
    #[serde(default)]
    pub completed: bool,
}

impl Identified for Comic {
    fn id(&self) -> &str {
        &self.id
    }
}
impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}
impl Identified for ReadingStats {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Dated for Comic {
    fn date(&self) -> OffsetDateTime {
        self.added_at
    }
}
impl Dated for User {
    fn date(&self) -> OffsetDateTime {
        self.created_at
    }
}
impl Dated for ReadingStats {
    fn date(&self) -> OffsetDateTime {
        self.session_started_at
    }
}
