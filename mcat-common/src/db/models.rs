//! Database models

use serde::{Deserialize, Serialize};

/// Catalog entry for one audio file
///
/// `id` is derived from the normalized source path, so rescanning the same
/// file always produces the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    /// Device file URI
    pub source_path: String,
    pub title: String,
    pub artist_name: String,
    pub album_name: String,
    pub genre: String,
    /// `M:SS`
    pub duration_formatted: String,
    /// `data:` URI or remote URI
    pub artwork_uri: Option<String>,
    /// Cached dominant artwork color
    pub artwork_color: Option<String>,
    /// Epoch milliseconds
    pub last_modified: Option<i64>,
    /// Bytes
    pub file_size: Option<i64>,
}

/// User-created ordered collection of track ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Explicit cover, or the first member's artwork when unset
    pub cover_art: Option<String>,
    pub track_ids: Vec<String>,
}

/// Data for creating a playlist; the id and timestamps are generated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlaylist {
    pub name: String,
    pub description: Option<String>,
    pub cover_art: Option<String>,
    pub track_ids: Vec<String>,
}

/// One page of tracks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPage {
    pub tracks: Vec<Track>,
    pub has_more: bool,
    /// Total number of rows the page was taken from
    pub total: usize,
}

impl TrackPage {
    pub fn empty() -> Self {
        Self::default()
    }
}
