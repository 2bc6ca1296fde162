//! Ephemeral read cache
//!
//! Keeps a minimized copy of the most recently loaded track list in a
//! [`KeyValueStore`] so the UI can render before the catalog answers.
//!
//! Layout:
//! - `song_cache_chunk_<i>`: JSON array of up to `chunk_size` songs
//! - `song_cache_chunk_count`: chunks actually written
//! - `song_cache_timestamp`: write time in epoch milliseconds
//!
//! The whole cache expires at once when older than the TTL. Nothing here
//! returns an error to the caller: storage failures are logged and read as
//! a miss.

use super::kv::KeyValueStore;
use futures::future::join_all;
use mcat_common::config::CacheConfig;
use mcat_common::db::Track;
use mcat_common::time::now_ms;
use mcat_common::{CatalogEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const CHUNK_KEY_PREFIX: &str = "song_cache_chunk_";
const CHUNK_COUNT_KEY: &str = "song_cache_chunk_count";
const TIMESTAMP_KEY: &str = "song_cache_timestamp";

const MAX_TITLE_CHARS: usize = 100;
const MAX_ARTIST_CHARS: usize = 100;
const MAX_ALBUM_CHARS: usize = 100;
/// Artwork URIs at or above this length are dropped, never cut
const MAX_ARTWORK_CHARS: usize = 200;

fn chunk_key(index: usize) -> String {
    format!("{CHUNK_KEY_PREFIX}{index}")
}

/// Minimized track record stored in the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSong {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artist: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub album: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub genre: String,
    pub duration: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artwork_color: Option<String>,
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

impl From<&Track> for CachedSong {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            title: truncate_chars(&track.title, MAX_TITLE_CHARS),
            artist: truncate_chars(&track.artist_name, MAX_ARTIST_CHARS),
            album: truncate_chars(&track.album_name, MAX_ALBUM_CHARS),
            genre: track.genre.clone(),
            duration: track.duration_formatted.clone(),
            url: track.source_path.clone(),
            artwork: track
                .artwork_uri
                .clone()
                .filter(|a| !a.is_empty() && a.chars().count() < MAX_ARTWORK_CHARS),
            artwork_color: track.artwork_color.clone().filter(|c| !c.is_empty()),
        }
    }
}

impl From<CachedSong> for Track {
    fn from(song: CachedSong) -> Self {
        Track {
            id: song.id,
            source_path: song.url,
            title: song.title,
            artist_name: song.artist,
            album_name: song.album,
            genre: song.genre,
            duration_formatted: song.duration,
            artwork_uri: song.artwork,
            artwork_color: song.artwork_color,
            last_modified: None,
            file_size: None,
        }
    }
}

/// Chunked, size-bounded, time-expiring cache of the last loaded tracks
///
/// Assumes a single writer; concurrent `cache_songs` calls may interleave.
pub struct SongCache {
    kv: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    events: EventBus,
}

impl SongCache {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self {
            kv,
            config,
            events: EventBus::default(),
        }
    }

    /// Publish `CacheWritten` events on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    fn chunk_size(&self) -> usize {
        self.config.chunk_size.max(1)
    }

    /// Most items a single write keeps
    pub fn capacity(&self) -> usize {
        self.chunk_size() * self.config.max_chunks
    }

    pub async fn get_cached_songs(&self) -> Option<Vec<CachedSong>> {
        self.get_cached_songs_at(now_ms()).await
    }

    /// Read the cache as of `now` (epoch ms)
    ///
    /// Returns `None` when the cache is missing, expired, or nothing could
    /// be read. An expired cache is cleared before returning.
    pub async fn get_cached_songs_at(&self, now: i64) -> Option<Vec<CachedSong>> {
        let timestamp = self.read_number::<i64>(TIMESTAMP_KEY).await?;

        if now - timestamp > self.config.ttl_ms {
            debug!(age_ms = now - timestamp, "Song cache expired");
            self.clear_cache().await;
            return None;
        }

        let count = self
            .read_number::<usize>(CHUNK_COUNT_KEY)
            .await
            .unwrap_or(0)
            .min(self.config.max_chunks);

        let indices: Vec<usize> = (0..count).collect();
        let mut songs = Vec::new();
        for group in indices.chunks(self.config.read_batch_width.max(1)) {
            let chunks = join_all(group.iter().map(|&index| self.read_chunk(index))).await;
            for chunk in chunks.into_iter().flatten() {
                songs.extend(chunk);
            }
        }

        if songs.is_empty() {
            None
        } else {
            debug!("Read {} songs from {} cache chunks", songs.len(), count);
            Some(songs)
        }
    }

    async fn read_chunk(&self, index: usize) -> Option<Vec<CachedSong>> {
        let key = chunk_key(index);
        let payload = match self.kv.get_item(&key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(key = %key, "Cache chunk missing");
                return None;
            }
            Err(e) => {
                warn!(key = %key, "Failed to read cache chunk: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(songs) => Some(songs),
            Err(e) => {
                warn!(key = %key, "Skipping unparseable cache chunk: {}", e);
                None
            }
        }
    }

    async fn read_number<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        match self.kv.get_item(key).await {
            Ok(value) => value.and_then(|v| v.trim().parse().ok()),
            Err(e) => {
                warn!(key, "Failed to read cache metadata: {}", e);
                None
            }
        }
    }

    /// Replace the cache with `tracks` and return the chunks written
    pub async fn cache_songs(&self, tracks: &[Track]) -> usize {
        self.cache_songs_at(tracks, now_ms()).await
    }

    /// [`cache_songs`](Self::cache_songs) with an explicit write time
    pub async fn cache_songs_at(&self, tracks: &[Track], now: i64) -> usize {
        let songs: Vec<CachedSong> = tracks
            .iter()
            .take(self.capacity())
            .map(CachedSong::from)
            .collect();
        self.write_songs(songs, now).await
    }

    /// Concatenate `tracks` onto the cached list and rewrite everything
    pub async fn append_to_cache(&self, tracks: &[Track]) -> usize {
        let mut songs = self.get_cached_songs().await.unwrap_or_default();
        songs.extend(tracks.iter().map(CachedSong::from));
        songs.truncate(self.capacity());
        self.write_songs(songs, now_ms()).await
    }

    async fn write_songs(&self, songs: Vec<CachedSong>, now: i64) -> usize {
        self.clear_cache().await;

        if songs.is_empty() {
            return 0;
        }

        // Metadata goes in first so a full store still has room to record the count
        let reserved = match self.kv.set_item(TIMESTAMP_KEY, &now.to_string()).await {
            Ok(()) => self.kv.set_item(CHUNK_COUNT_KEY, "0").await,
            Err(e) => Err(e),
        };
        if let Err(e) = reserved {
            warn!("Failed to record cache metadata: {}", e);
            self.remove_chunks(0).await;
            return 0;
        }

        let mut written = 0;
        for (index, chunk) in songs.chunks(self.chunk_size()).enumerate() {
            let payload = match serde_json::to_string(chunk) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to serialize cache chunk {}: {}", index, e);
                    break;
                }
            };

            match self.kv.set_item(&chunk_key(index), &payload).await {
                Ok(()) => written += 1,
                Err(e) if e.is_quota_exceeded() => {
                    warn!("Storage full after {} cache chunks: {}", written, e);
                    break;
                }
                Err(e) => {
                    warn!("Failed to write cache chunk {}: {}", index, e);
                    self.remove_chunks(written).await;
                    return 0;
                }
            }
        }

        if written == 0 {
            self.remove_chunks(0).await;
            return 0;
        }

        if let Err(e) = self.kv.set_item(CHUNK_COUNT_KEY, &written.to_string()).await {
            warn!("Failed to record cache chunk count, dropping chunks: {}", e);
            self.remove_chunks(written).await;
            return 0;
        }

        let cached = songs.len().min(written * self.chunk_size());
        info!("Cached {} songs in {} chunks", cached, written);
        self.events
            .emit_lossy(CatalogEvent::CacheWritten { chunks: written });
        written
    }

    async fn remove_chunks(&self, count: usize) {
        let mut keys: Vec<String> = (0..count).map(chunk_key).collect();
        keys.push(CHUNK_COUNT_KEY.to_string());
        keys.push(TIMESTAMP_KEY.to_string());
        if let Err(e) = self.kv.multi_remove(&keys).await {
            warn!("Failed to remove cache chunks: {}", e);
        }
    }

    /// Remove every chunk the recorded count implies plus the metadata keys
    pub async fn clear_cache(&self) {
        let count = self
            .read_number::<usize>(CHUNK_COUNT_KEY)
            .await
            .unwrap_or(0)
            .min(self.config.max_chunks);

        let mut keys: Vec<String> = (0..count).map(chunk_key).collect();
        keys.push(CHUNK_COUNT_KEY.to_string());
        keys.push(TIMESTAMP_KEY.to_string());

        if let Err(e) = self.kv.multi_remove(&keys).await {
            warn!("Failed to clear song cache: {}", e);
        }
    }
}
