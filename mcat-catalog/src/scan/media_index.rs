//! Device media index capability
//!
//! The OS media library is consumed through [`MediaIndex`]; the scan
//! service never talks to the platform directly.

use async_trait::async_trait;
use mcat_common::Result;
use serde::{Deserialize, Serialize};

/// Raw, unprocessed record returned by the media index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTrackDescriptor {
    /// File URI or path as reported by the platform
    pub url: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub duration_ms: i64,
    /// Artwork URI, possibly a `data:` URI
    pub cover: Option<String>,
    /// Epoch milliseconds
    pub last_modified: Option<i64>,
    /// Bytes
    pub file_size: Option<i64>,
}

/// Sort direction for media index queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// Parse "asc"/"desc" (anything other than "desc" is ascending)
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }
}

/// Device media index (OS media library)
#[async_trait]
pub trait MediaIndex: Send + Sync {
    /// Ask for media-library access
    async fn request_permission(&self) -> Result<bool>;

    /// One window of audio descriptors
    ///
    /// # Returns
    /// * `Ok(descriptors)` - fewer than `limit` means the index is exhausted
    /// * `Err(Error::MediaIndex)` - the query failed
    async fn list_audio(
        &self,
        offset: usize,
        limit: usize,
        sort_by: &str,
        sort_order: SortOrder,
    ) -> Result<Vec<RawTrackDescriptor>>;

    /// Ask the platform to (re)index one directory before a rescan
    async fn probe_directory(&self, _directory: &str) -> Result<()> {
        Ok(())
    }
}
