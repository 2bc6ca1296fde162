//! UI-facing read adapter
//!
//! Catalog read failures show up in the UI as an empty library, not an
//! error dialog. [`CatalogReads`] applies that policy on top of
//! [`CatalogStore`]: every error is logged and replaced with an empty
//! default. Writes are not wrapped; callers handle their errors.
//!
//! Loading through the [`ScanService`] keeps the errors a caller must act
//! on (permission refused, scan cancelled) and only defaults storage
//! failures.

use crate::scan::ScanService;
use crate::store::CatalogStore;
use mcat_common::db::{Playlist, Track, TrackPage};
use mcat_common::{Error, Result};
use tracing::warn;

/// Log a failed read and fall back to the type's default
fn or_default<T: Default>(result: Result<T>, operation: &str) -> T {
    result
        .inspect_err(|e| warn!("Catalog read {} failed: {}", operation, e))
        .unwrap_or_default()
}

/// Turn a storage failure into an empty page; pass everything else through
fn or_empty_page(result: Result<TrackPage>, operation: &str) -> Result<TrackPage> {
    match result {
        Err(e @ (Error::Database(_) | Error::Io(_) | Error::Serialization(_))) => {
            warn!("Catalog read {} failed: {}", operation, e);
            Ok(TrackPage::empty())
        }
        other => other,
    }
}

#[derive(Debug, Clone)]
pub struct CatalogReads {
    store: CatalogStore,
}

impl CatalogReads {
    pub fn new(store: CatalogStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Load one page through the scan service
    ///
    /// Storage errors read as an empty library. Permission and cancellation
    /// errors are returned.
    pub async fn load_tracks(&self, scan: &ScanService, page: usize) -> Result<TrackPage> {
        or_empty_page(scan.get_all_tracks(page).await, "load_tracks")
    }

    pub async fn get_all_tracks(&self) -> Vec<Track> {
        or_default(self.store.get_all_tracks().await, "get_all_tracks")
    }

    pub async fn get_tracks_page(&self, page: usize, page_size: usize) -> TrackPage {
        or_default(
            self.store.get_tracks_page(page, page_size).await,
            "get_tracks_page",
        )
    }

    pub async fn get_track_by_id(&self, id: &str) -> Option<Track> {
        or_default(self.store.get_track_by_id(id).await, "get_track_by_id")
    }

    pub async fn count_tracks(&self) -> usize {
        or_default(self.store.count_tracks().await, "count_tracks")
    }

    pub async fn has_any_tracks(&self) -> bool {
        or_default(self.store.has_any_tracks().await, "has_any_tracks")
    }

    pub async fn get_playlists(&self) -> Vec<Playlist> {
        or_default(self.store.get_playlists().await, "get_playlists")
    }

    pub async fn get_playlist_by_id(&self, playlist_id: &str) -> Option<Playlist> {
        or_default(
            self.store.get_playlist_by_id(playlist_id).await,
            "get_playlist_by_id",
        )
    }

    pub async fn get_playlist_tracks(&self, playlist_id: &str) -> Vec<Track> {
        or_default(
            self.store.get_playlist_tracks(playlist_id).await,
            "get_playlist_tracks",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcat_common::db::open_in_memory;

    #[tokio::test]
    async fn test_reads_default_when_store_fails() {
        let pool = open_in_memory().await.unwrap();
        let reads = CatalogReads::new(CatalogStore::new(pool.clone()));

        // Closing the pool makes every query fail
        pool.close().await;

        assert!(reads.get_all_tracks().await.is_empty());
        assert_eq!(reads.get_tracks_page(0, 100).await, TrackPage::empty());
        assert_eq!(reads.get_track_by_id("x").await, None);
        assert_eq!(reads.count_tracks().await, 0);
        assert!(!reads.has_any_tracks().await);
        assert!(reads.get_playlists().await.is_empty());
        assert_eq!(reads.get_playlist_by_id("pl").await, None);
        assert!(reads.get_playlist_tracks("pl").await.is_empty());
    }

    #[test]
    fn test_only_storage_errors_become_empty_pages() {
        let io = Error::Io(std::io::Error::other("disk gone"));
        assert_eq!(or_empty_page(Err(io), "io").unwrap(), TrackPage::empty());

        let denied = or_empty_page(Err(Error::PermissionDenied("library".into())), "denied");
        assert!(matches!(denied, Err(Error::PermissionDenied(_))));

        let cancelled = or_empty_page(Err(Error::Cancelled), "cancelled");
        assert!(matches!(cancelled, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_reads_pass_through_on_success() {
        let pool = open_in_memory().await.unwrap();
        let reads = CatalogReads::new(CatalogStore::new(pool));

        assert!(!reads.has_any_tracks().await);
        assert_eq!(reads.get_tracks_page(0, 100).await.total, 0);
    }
}
