//! Data models for the Streamflix catalog and user-state records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MovieId = i64;
pub type LinkId = i64;
pub type StateId = i64;

/// Streaming item content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Movie,
    Show,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Show => "show",
        }
    }
}

/// One candidate playback link of a streaming item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingLink {
    pub id: LinkId,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub language: String,
    pub source_url: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

/// Scraped catalog entry with its playback links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingItem {
    pub id: MovieId,
    #[serde(default)]
    pub imdb_id: String,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(rename = "type", default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub poster_url: Option<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub links: Vec<StreamingLink>,
    /// Set by the server while a link discovery job is running for this item.
    #[serde(rename = "_refreshing", default)]
    pub refreshing: bool,
}

impl StreamingItem {
    /// Links eligible for selection, in the order the server sent them.
    pub fn eligible_links(&self) -> impl Iterator<Item = &StreamingLink> {
        self.links.iter().filter(|l| l.is_active)
    }

    pub fn first_eligible(&self) -> Option<&StreamingLink> {
        self.eligible_links().next()
    }

    pub fn link(&self, id: LinkId) -> Option<&StreamingLink> {
        self.links.iter().find(|l| l.id == id)
    }
}

/// Watch status stored on the user-state record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    Watching,
    Watched,
}

/// Per-user, per-movie flags and progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMovieState {
    pub id: StateId,
    #[serde(default)]
    pub movie_id: Option<MovieId>,
    #[serde(default)]
    pub status: Option<WatchStatus>,
    /// 0..=100. The server column is wider; larger values are clamped.
    #[serde(default, deserialize_with = "clamped_percent")]
    pub progress_percent: u8,
    #[serde(default)]
    pub position_seconds: u32,
    #[serde(default)]
    pub in_my_list: bool,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_downloaded: bool,
    #[serde(default)]
    pub last_watched_at: Option<DateTime<Utc>>,
}

/// Read a small unsigned integer and clamp it to a percentage.
fn clamped_percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = u16::deserialize(deserializer)?;
    Ok(raw.min(100) as u8)
}

impl UserMovieState {
    pub fn has_progress(&self) -> bool {
        self.progress_percent > 0 || self.position_seconds > 0 || self.status.is_some()
    }
}

/// Partial user-state payload. Only the fields that are `Some` are sent.
///
/// `status` is doubly optional so a patch can explicitly clear it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Option<WatchStatus>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_my_list: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_downloaded: Option<bool>,
}

impl StatePatch {
    pub fn is_empty(&self) -> bool {
        *self == StatePatch::default()
    }

    /// Fold `later` into `self`; fields set in `later` win.
    pub fn merge(&mut self, later: StatePatch) {
        if later.status.is_some() {
            self.status = later.status;
        }
        if later.progress_percent.is_some() {
            self.progress_percent = later.progress_percent;
        }
        if later.position_seconds.is_some() {
            self.position_seconds = later.position_seconds;
        }
        if later.in_my_list.is_some() {
            self.in_my_list = later.in_my_list;
        }
        if later.is_favorite.is_some() {
            self.is_favorite = later.is_favorite;
        }
        if later.is_downloaded.is_some() {
            self.is_downloaded = later.is_downloaded;
        }
    }

    /// Apply the patch to a local record (optimistic update).
    pub fn apply_to(&self, state: &mut UserMovieState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(p) = self.progress_percent {
            state.progress_percent = p;
        }
        if let Some(s) = self.position_seconds {
            state.position_seconds = s;
        }
        if let Some(v) = self.in_my_list {
            state.in_my_list = v;
        }
        if let Some(v) = self.is_favorite {
            state.is_favorite = v;
        }
        if let Some(v) = self.is_downloaded {
            state.is_downloaded = v;
        }
    }
}

/// Catalog movie record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub genre: Vec<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub match_score: u32,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_trending: bool,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub user_state: Option<UserMovieState>,
}

/// Response of `refresh_links`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefreshAck {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

/// Response of `clear_history`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClearHistoryResponse {
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub count: u64,
}
