//! Scan/reconcile integration tests
//!
//! A scripted media index stands in for the device library; the catalog is
//! a private in-memory database per test.

use async_trait::async_trait;
use mcat_catalog::scan::{track_id, MemoryColorCache, SortOrder};
use mcat_catalog::{
    CatalogReads, CatalogStore, ColorCache, ExclusionFilter, MediaIndex, PersistMode,
    RawTrackDescriptor, ScanService,
};
use mcat_common::config::ScanConfig;
use mcat_common::db::{open_in_memory, NewPlaylist, Track, TrackPage};
use mcat_common::{CatalogEvent, Error, EventBus, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Media index serving a fixed descriptor list
#[derive(Default)]
struct ScriptedIndex {
    descriptors: Vec<RawTrackDescriptor>,
    deny_permission: bool,
    /// Batches starting at or beyond this offset fail
    fail_from_offset: Option<usize>,
    failing_probes: Vec<String>,
    /// Urls that have left the device since the index was built
    deleted: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    probed: Mutex<Vec<String>>,
}

impl ScriptedIndex {
    fn with_songs(count: usize) -> Self {
        Self {
            descriptors: (0..count).map(|i| song(&format!("/music/{i:04}.mp3"))).collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn delete_file(&self, path: &str) {
        self.deleted.lock().unwrap().push(format!("file://{path}"));
    }
}

#[async_trait]
impl MediaIndex for ScriptedIndex {
    async fn request_permission(&self) -> Result<bool> {
        Ok(!self.deny_permission)
    }

    async fn list_audio(
        &self,
        offset: usize,
        limit: usize,
        _sort_by: &str,
        _sort_order: SortOrder,
    ) -> Result<Vec<RawTrackDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_from_offset.is_some_and(|fail| offset >= fail) {
            return Err(Error::MediaIndex(format!("query at offset {offset} failed")));
        }
        let deleted = self.deleted.lock().unwrap().clone();
        Ok(self
            .descriptors
            .iter()
            .filter(|d| !deleted.contains(&d.url))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn probe_directory(&self, directory: &str) -> Result<()> {
        self.probed.lock().unwrap().push(directory.to_string());
        if self.failing_probes.iter().any(|d| d == directory) {
            return Err(Error::MediaIndex(format!("cannot probe {directory}")));
        }
        Ok(())
    }
}

fn song(path: &str) -> RawTrackDescriptor {
    let stem = path.rsplit('/').next().unwrap_or(path).trim_end_matches(".mp3");
    RawTrackDescriptor {
        url: format!("file://{path}"),
        title: format!("Song {stem}"),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        genre: "Pop".to_string(),
        duration_ms: 180_000,
        cover: None,
        last_modified: Some(1_700_000_000_000),
        file_size: Some(4_000_000),
    }
}

fn stored_track(path: &str) -> Track {
    Track {
        id: track_id(path),
        source_path: path.to_string(),
        title: path.to_string(),
        artist_name: String::new(),
        album_name: String::new(),
        genre: String::new(),
        duration_formatted: "0:30".to_string(),
        artwork_uri: None,
        artwork_color: None,
        last_modified: None,
        file_size: None,
    }
}

fn test_config() -> ScanConfig {
    ScanConfig {
        rescan_delay_ms: 0,
        ..ScanConfig::default()
    }
}

async fn setup(index: ScriptedIndex, config: ScanConfig) -> (ScanService, Arc<ScriptedIndex>) {
    setup_with_colors(index, config, Arc::new(MemoryColorCache::new())).await
}

async fn setup_with_colors(
    index: ScriptedIndex,
    config: ScanConfig,
    colors: Arc<dyn ColorCache>,
) -> (ScanService, Arc<ScriptedIndex>) {
    let pool = open_in_memory().await.expect("Failed to open in-memory catalog");
    let index = Arc::new(index);
    let service = ScanService::new(
        CatalogStore::new(pool),
        index.clone(),
        colors,
        config,
        ExclusionFilter::default(),
        EventBus::new(64),
    );
    (service, index)
}

#[tokio::test]
async fn test_cold_start_pages_through_device_scan() {
    let (service, _index) = setup(ScriptedIndex::with_songs(150), test_config()).await;

    let first = service.get_all_tracks(0).await.unwrap();
    assert_eq!(first.tracks.len(), 100);
    assert!(first.has_more);

    let second = service.get_all_tracks(1).await.unwrap();
    assert_eq!(second.tracks.len(), 50);
    assert!(!second.has_more);

    service.wait_for_background().await;
    assert_eq!(service.store().count_tracks().await.unwrap(), 150);
}

#[tokio::test]
async fn test_populated_catalog_is_served_without_scanning() {
    let (service, index) = setup(ScriptedIndex::with_songs(30), test_config()).await;

    service.get_all_tracks(0).await.unwrap();
    service.wait_for_background().await;
    let calls_after_scan = index.calls();

    let page = service.get_all_tracks(0).await.unwrap();
    assert_eq!(page.tracks.len(), 30);
    assert!(!page.has_more);
    assert_eq!(index.calls(), calls_after_scan);
}

#[tokio::test]
async fn test_scanned_tracks_are_normalized() {
    let colors = Arc::new(MemoryColorCache::new());
    colors.store_color("file:///music/0000.mp3", "#123456").await;

    let (service, _index) =
        setup_with_colors(ScriptedIndex::with_songs(1), test_config(), colors).await;

    let scanned = service
        .scan_and_save_tracks(0, PersistMode::Awaited)
        .await
        .unwrap();
    assert!(scanned.persist.is_none());

    let track = &scanned.page.tracks[0];
    assert_eq!(track.id, track_id("/music/0000.mp3"));
    assert_eq!(track.source_path, "file:///music/0000.mp3");
    assert_eq!(track.duration_formatted, "3:00");
    assert_eq!(track.artwork_color.as_deref(), Some("#123456"));

    let stored = service.store().get_track_by_id(&track.id).await.unwrap();
    assert_eq!(stored.as_ref(), Some(track));
}

#[tokio::test]
async fn test_excluded_descriptors_never_reach_catalog() {
    let mut index = ScriptedIndex::with_songs(3);
    index.descriptors.push(song("/storage/WhatsApp/Media/a.mp3"));
    index.descriptors.push(song("/music/AUD-20230101-WA0001.mp3"));
    index.descriptors.push(song("/media/Ringtones/beep.mp3"));
    let (service, _index) = setup(index, test_config()).await;

    let page = service.get_all_tracks(0).await.unwrap();
    assert_eq!(page.tracks.len(), 3);
    assert!(!page.has_more);

    service.wait_for_background().await;
    assert_eq!(service.store().count_tracks().await.unwrap(), 3);
}

#[tokio::test]
async fn test_duplicate_paths_collapse_to_one_track() {
    let mut index = ScriptedIndex::with_songs(2);
    let mut spelled_differently = song("/music/0000.mp3");
    spelled_differently.url = "file:///Music//0000.mp3".to_string();
    index.descriptors.push(spelled_differently);
    let (service, _index) = setup(index, test_config()).await;

    let scanned = service
        .scan_and_save_tracks(0, PersistMode::Awaited)
        .await
        .unwrap();

    assert_eq!(scanned.page.tracks.len(), 2);
    // First occurrence wins
    assert_eq!(scanned.page.tracks[0].source_path, "file:///music/0000.mp3");
    assert_eq!(service.store().count_tracks().await.unwrap(), 2);
}

#[tokio::test]
async fn test_permission_denied_is_hard_failure() {
    let index = ScriptedIndex {
        deny_permission: true,
        ..ScriptedIndex::with_songs(10)
    };
    let (service, index) = setup(index, test_config()).await;

    let result = service.get_all_tracks(0).await;

    assert!(matches!(result, Err(Error::PermissionDenied(_))));
    assert_eq!(index.calls(), 0);
    assert!(!service.store().has_any_tracks().await.unwrap());
}

#[tokio::test]
async fn test_failing_batch_keeps_earlier_results() {
    let index = ScriptedIndex {
        fail_from_offset: Some(200),
        ..ScriptedIndex::with_songs(450)
    };
    let config = ScanConfig {
        batch_size: 100,
        ..test_config()
    };
    let (service, _index) = setup(index, config).await;

    let scanned = service
        .scan_and_save_tracks(1, PersistMode::Awaited)
        .await
        .unwrap();

    assert_eq!(scanned.page.tracks.len(), 100);
    assert!(!scanned.page.has_more);
    assert_eq!(service.store().count_tracks().await.unwrap(), 200);
}

#[tokio::test]
async fn test_page_zero_exits_early_and_finishes_in_background() {
    let config = ScanConfig {
        batch_size: 100,
        ..test_config()
    };
    let (service, index) = setup(ScriptedIndex::with_songs(500), config).await;

    let scanned = service
        .scan_and_save_tracks(0, PersistMode::Detached)
        .await
        .unwrap();

    // Two pages gathered, then the caller gets its answer
    assert_eq!(scanned.page.tracks.len(), 100);
    assert!(scanned.page.has_more);

    let persisted = scanned.persist.expect("page 0 persists in the background");
    assert_eq!(persisted.wait().await.unwrap(), 500);
    assert_eq!(service.store().count_tracks().await.unwrap(), 500);
    // Two foreground batches, four to finish the walk (the last one short)
    assert_eq!(index.calls(), 6);
}

#[tokio::test]
async fn test_batch_limit_bounds_scan() {
    let config = ScanConfig {
        batch_size: 10,
        max_batches: 3,
        ..test_config()
    };
    let (service, index) = setup(ScriptedIndex::with_songs(100), config).await;

    let scanned = service
        .scan_and_save_tracks(1, PersistMode::Awaited)
        .await
        .unwrap();

    assert!(scanned.page.tracks.is_empty());
    assert_eq!(index.calls(), 3);
    assert_eq!(service.store().count_tracks().await.unwrap(), 30);
}

#[tokio::test]
async fn test_cancelled_scan_persists_nothing() {
    let (service, index) = setup(ScriptedIndex::with_songs(10), test_config()).await;

    service.cancel_scans();
    let result = service.scan_and_save_tracks(0, PersistMode::Awaited).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(index.calls(), 0);
    assert!(!service.store().has_any_tracks().await.unwrap());
}

#[tokio::test]
async fn test_drifted_catalog_triggers_single_rescan() {
    let (service, _index) = setup(ScriptedIndex::with_songs(5), test_config()).await;
    let mut events_rx = subscribe(&service);

    let mut stale: Vec<Track> = (0..12)
        .map(|i| stored_track(&format!("/storage/WhatsApp/Media/{i}.opus")))
        .collect();
    stale.push(stored_track("/music/kept.mp3"));
    service.store().upsert_tracks(&stale).await.unwrap();

    let page = service.get_all_tracks(0).await.unwrap();
    assert_eq!(page.tracks.len(), 1);
    assert!(!page.has_more);

    // A second read while the first rescan is pending does not queue another
    service.get_all_tracks(0).await.unwrap();

    service.wait_for_background().await;

    let tracks = service.store().get_all_tracks().await.unwrap();
    assert_eq!(tracks.len(), 5);
    assert!(tracks.iter().all(|t| t.source_path.starts_with("file:///music/")));

    let events = drain(&mut events_rx);
    let scheduled = events
        .iter()
        .filter(|e| matches!(e, CatalogEvent::RescanScheduled { .. }))
        .count();
    assert_eq!(scheduled, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, CatalogEvent::RescanCompleted { count: 5 })));
}

#[tokio::test]
async fn test_small_drift_does_not_rescan() {
    let (service, _index) = setup(ScriptedIndex::with_songs(5), test_config()).await;
    let mut events_rx = subscribe(&service);

    let stale: Vec<Track> = (0..10)
        .map(|i| stored_track(&format!("/storage/WhatsApp/Media/{i}.opus")))
        .collect();
    service.store().upsert_tracks(&stale).await.unwrap();

    let page = service.get_all_tracks(0).await.unwrap();
    assert!(page.tracks.is_empty());

    service.wait_for_background().await;
    assert_eq!(service.store().count_tracks().await.unwrap(), 10);
    assert!(!drain(&mut events_rx)
        .iter()
        .any(|e| matches!(e, CatalogEvent::RescanScheduled { .. })));
}

#[tokio::test]
async fn test_rescan_replaces_catalog_and_skips_failed_probes() {
    let index = ScriptedIndex {
        failing_probes: vec!["/sdcard/Music".to_string()],
        ..ScriptedIndex::with_songs(120)
    };
    let config = ScanConfig {
        music_directories: vec!["/sdcard/Music".to_string(), "/music".to_string()],
        ..test_config()
    };
    let (service, index) = setup(index, config).await;
    service
        .store()
        .upsert_tracks(&[stored_track("/old/removed.mp3")])
        .await
        .unwrap();

    let first = service.rescan_tracks().await.unwrap();

    assert_eq!(first.tracks.len(), 100);
    assert!(first.has_more);
    assert_eq!(service.store().count_tracks().await.unwrap(), 120);
    assert_eq!(
        service
            .store()
            .get_track_by_id(&track_id("/old/removed.mp3"))
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        *index.probed.lock().unwrap(),
        vec!["/sdcard/Music".to_string(), "/music".to_string()]
    );
}

#[tokio::test]
async fn test_rescan_drops_members_whose_file_is_gone() {
    let (service, index) = setup(ScriptedIndex::with_songs(3), test_config()).await;
    service.rescan_tracks().await.unwrap();

    let a = track_id("/music/0000.mp3");
    let b = track_id("/music/0001.mp3");
    let c = track_id("/music/0002.mp3");
    let store = service.store();
    let playlist = store
        .create_playlist(&NewPlaylist {
            name: "mix".to_string(),
            track_ids: vec![a.clone(), b.clone()],
            ..Default::default()
        })
        .await
        .unwrap();

    index.delete_file("/music/0000.mp3");
    service.rescan_tracks().await.unwrap();
    assert_eq!(store.count_tracks().await.unwrap(), 2);

    let mut stored = store.get_playlist_by_id(&playlist.id).await.unwrap().unwrap();
    let shown = store.get_playlist_tracks(&playlist.id).await.unwrap();
    assert_eq!(stored.track_ids, vec![b.clone()]);
    assert_eq!(shown.len(), 1);

    // The playlist as read back can be written back
    stored.name = "renamed".to_string();
    store.update_playlist(&stored).await.unwrap();
    store
        .reorder_playlist_tracks(&playlist.id, &[c.clone(), b.clone()])
        .await
        .unwrap();

    let positions: Vec<i64> = sqlx::query_scalar(
        "SELECT position FROM playlist_tracks WHERE playlist_id = ? ORDER BY position",
    )
    .bind(&playlist.id)
    .fetch_all(store.pool())
    .await
    .unwrap();
    assert_eq!(positions, vec![0, 1]);

    let updated = store.get_playlist_by_id(&playlist.id).await.unwrap().unwrap();
    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.track_ids, vec![c, b]);
}

#[tokio::test]
async fn test_scans_run_again_after_resume() {
    let (service, index) = setup(ScriptedIndex::with_songs(10), test_config()).await;

    service.cancel_scans();
    assert!(matches!(
        service.get_all_tracks(1).await,
        Err(Error::Cancelled)
    ));

    service.resume_scans();
    assert!(!service.is_cancelled());

    let page = service.get_all_tracks(0).await.unwrap();
    assert_eq!(page.tracks.len(), 10);
    service.wait_for_background().await;
    assert_eq!(service.store().count_tracks().await.unwrap(), 10);
    assert_eq!(index.calls(), 1);
}

#[tokio::test]
async fn test_resume_does_not_revive_cancelled_rescan() {
    let config = ScanConfig {
        rescan_delay_ms: 60_000,
        ..test_config()
    };
    let (service, _index) = setup(ScriptedIndex::with_songs(5), config).await;
    let stale: Vec<Track> = (0..12)
        .map(|i| stored_track(&format!("/storage/WhatsApp/Media/{i}.opus")))
        .collect();
    service.store().upsert_tracks(&stale).await.unwrap();

    service.get_all_tracks(0).await.unwrap();
    service.cancel_scans();
    service.resume_scans();
    service.wait_for_background().await;

    // The pending rescan saw the old token and never ran
    assert_eq!(service.store().count_tracks().await.unwrap(), 12);
}

#[tokio::test]
async fn test_load_tracks_reads_storage_failure_as_empty_library() {
    let (service, index) = setup(ScriptedIndex::with_songs(5), test_config()).await;
    let reads = CatalogReads::new(service.store().clone());

    service.store().pool().close().await;

    assert_eq!(reads.load_tracks(&service, 0).await.unwrap(), TrackPage::empty());
    assert_eq!(index.calls(), 0);
}

#[tokio::test]
async fn test_load_tracks_keeps_permission_denied() {
    let index = ScriptedIndex {
        deny_permission: true,
        ..ScriptedIndex::with_songs(5)
    };
    let (service, _index) = setup(index, test_config()).await;
    let reads = CatalogReads::new(service.store().clone());

    let result = reads.load_tracks(&service, 0).await;
    assert!(matches!(result, Err(Error::PermissionDenied(_))));
}

fn subscribe(service: &ScanService) -> tokio::sync::broadcast::Receiver<CatalogEvent> {
    service.events().subscribe()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<CatalogEvent>) -> Vec<CatalogEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
