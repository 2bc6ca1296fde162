//! Scan/reconcile service
//!
//! Bridges the device media index and the catalog store: pulls raw
//! descriptors in batches, drops excluded recordings, normalizes the rest
//! into tracks, de-duplicates them and persists the result.
//!
//! Failure handling:
//! - permission denied fails a fresh scan outright
//! - a failing batch stops further batching; earlier batches are kept
//! - directory probe errors during a rescan are logged and skipped
//! - catalog write errors propagate for awaited persists and are logged
//!   for detached ones

use super::color_cache::ColorCache;
use super::exclusion::ExclusionFilter;
use super::media_index::{MediaIndex, RawTrackDescriptor, SortOrder};
use super::normalize::track_id;
use super::policy::{should_exit_early, should_trigger_rescan, stored_has_more, PersistMode};
use crate::store::CatalogStore;
use mcat_common::config::ScanConfig;
use mcat_common::db::{Track, TrackPage};
use mcat_common::time::{format_duration_ms, millis_to_duration};
use mcat_common::{CatalogEvent, Error, EventBus, Result};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Background catalog write started by a scan
///
/// Dropping the task detaches it; the write still runs to completion.
#[derive(Debug)]
pub struct PersistTask {
    handle: JoinHandle<Result<usize>>,
}

impl PersistTask {
    /// Wait for the write and return the number of tracks persisted
    pub async fn wait(self) -> Result<usize> {
        self.handle
            .await
            .map_err(|e| Error::Internal(format!("Persist task failed: {e}")))?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// One page produced by a device scan
#[derive(Debug)]
pub struct ScanPage {
    pub page: TrackPage,
    /// Present when the catalog write was detached
    pub persist: Option<PersistTask>,
}

/// Descriptors pulled from the media index by one batch loop
#[derive(Debug, Default)]
struct Gathered {
    descriptors: Vec<RawTrackDescriptor>,
    /// Offset of the first descriptor not yet requested
    next_offset: usize,
    batches: usize,
    /// Index reported no more results, or a batch failed
    finished: bool,
    cancelled: bool,
}

/// Where a background write should pick the device walk back up
#[derive(Debug)]
struct Resume {
    offset: usize,
    remaining_batches: usize,
    seen_ids: HashSet<String>,
    cancel: CancellationToken,
}

/// Scan/reconcile service
///
/// Cheap to clone; clones share the store, collaborators, background task
/// registry and cancellation state.
#[derive(Clone)]
pub struct ScanService {
    store: CatalogStore,
    media_index: Arc<dyn MediaIndex>,
    colors: Arc<dyn ColorCache>,
    config: Arc<ScanConfig>,
    filter: ExclusionFilter,
    events: EventBus,
    /// Token handed to scans started from now on
    cancel: Arc<RwLock<CancellationToken>>,
    background: Arc<Mutex<Vec<PersistTask>>>,
    pending_rescan: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ScanService {
    pub fn new(
        store: CatalogStore,
        media_index: Arc<dyn MediaIndex>,
        colors: Arc<dyn ColorCache>,
        config: ScanConfig,
        filter: ExclusionFilter,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            media_index,
            colors,
            config: Arc::new(config),
            filter,
            events,
            cancel: Arc::new(RwLock::new(CancellationToken::new())),
            background: Arc::new(Mutex::new(Vec::new())),
            pending_rescan: Arc::new(Mutex::new(None)),
        }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Load one page of tracks
    ///
    /// Serves from the catalog when it holds anything; otherwise scans the
    /// device. Page 0 from a device scan returns before its catalog write
    /// completes.
    pub async fn get_all_tracks(&self, page: usize) -> Result<TrackPage> {
        self.store.init_schema().await?;

        if self.store.has_any_tracks().await? {
            return self.stored_page(page).await;
        }

        let scanned = self
            .scan_and_save_tracks(page, PersistMode::for_page(page))
            .await?;

        if let Some(task) = scanned.persist {
            self.track_background(task).await;
        }
        Ok(scanned.page)
    }

    async fn stored_page(&self, page: usize) -> Result<TrackPage> {
        let page_size = self.config.page_size;
        let stored = self.store.get_tracks_page(page, page_size).await?;

        let (tracks, filtered_out) = self.filter.retain(stored.tracks, |t| &t.source_path);

        if should_trigger_rescan(page, filtered_out, self.config.rescan_filter_threshold) {
            info!(
                filtered_out,
                "Stored catalog out of sync with exclusion rules, scheduling rescan"
            );
            self.schedule_rescan(filtered_out).await;
        }

        Ok(TrackPage {
            tracks,
            has_more: stored_has_more(page, page_size, stored.total, filtered_out),
            total: stored.total.saturating_sub(filtered_out),
        })
    }

    /// Scan the device index, persist the result and return one page
    pub async fn scan_and_save_tracks(&self, page: usize, mode: PersistMode) -> Result<ScanPage> {
        if !self.media_index.request_permission().await? {
            warn!("Media library permission denied");
            return Err(Error::PermissionDenied("media library".to_string()));
        }

        let cancel = self.scan_token();
        let gathered = self
            .fetch_batches(&cancel, 0, Some(page), self.config.max_batches)
            .await;
        if gathered.cancelled {
            info!("Scan cancelled before page {} was gathered", page);
            return Err(Error::Cancelled);
        }

        let mut seen_ids = HashSet::new();
        let tracks = self.build_tracks(gathered.descriptors, &mut seen_ids).await;

        let page_size = self.config.page_size;
        let start = page.saturating_mul(page_size).min(tracks.len());
        let end = start.saturating_add(page_size).min(tracks.len());
        let has_more = end < tracks.len() || !gathered.finished;
        let page_tracks = tracks[start..end].to_vec();
        let total = tracks.len();

        let resume = (!gathered.finished && gathered.batches < self.config.max_batches).then(|| {
            Resume {
                offset: gathered.next_offset,
                remaining_batches: self.config.max_batches - gathered.batches,
                seen_ids,
                cancel,
            }
        });

        let persist = match mode {
            PersistMode::Detached => {
                let service = self.clone();
                let handle = tokio::spawn(async move {
                    service
                        .persist(tracks, resume)
                        .await
                        .inspect_err(|e| error!("Background catalog write failed: {}", e))
                });
                Some(PersistTask { handle })
            }
            PersistMode::Awaited => {
                self.persist(tracks, resume).await?;
                None
            }
        };

        self.events.emit_lossy(CatalogEvent::ScanCompleted {
            page,
            returned: page_tracks.len(),
            has_more,
        });

        Ok(ScanPage {
            page: TrackPage {
                tracks: page_tracks,
                has_more,
                total,
            },
            persist,
        })
    }

    /// Clear the catalog and rebuild it from a fresh device scan
    pub async fn rescan_tracks(&self) -> Result<TrackPage> {
        info!("Starting full rescan");
        let cancel = self.scan_token();
        self.store.clear_tracks().await?;

        for directory in &self.config.music_directories {
            if let Err(e) = self.media_index.probe_directory(directory).await {
                warn!(directory = %directory, "Skipping directory probe: {}", e);
            }
        }

        let scanned = self.scan_and_save_tracks(0, PersistMode::Awaited).await?;
        if cancel.is_cancelled() {
            // Catalog may be partial; keep memberships until a full rescan
            info!("Rescan cancelled mid-walk, keeping playlist members");
        } else {
            self.store.prune_missing_members().await?;
        }

        self.events.emit_lossy(CatalogEvent::RescanCompleted {
            count: scanned.page.tracks.len(),
        });
        Ok(scanned.page)
    }

    fn scan_token(&self) -> CancellationToken {
        self.cancel
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Request cooperative cancellation of running scans
    ///
    /// Scans started afterwards stay cancelled until [`resume_scans`](Self::resume_scans).
    pub fn cancel_scans(&self) {
        self.scan_token().cancel();
    }

    /// Allow new scans after [`cancel_scans`](Self::cancel_scans)
    ///
    /// Scans that were already cancelled stay cancelled.
    pub fn resume_scans(&self) {
        let mut token = self
            .cancel
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if token.is_cancelled() {
            *token = CancellationToken::new();
            info!("Scans resumed");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.scan_token().is_cancelled()
    }

    /// Wait for every detached write and any pending rescan
    pub async fn wait_for_background(&self) {
        let pending = self.pending_rescan.lock().await.take();
        if let Some(handle) = pending {
            if let Err(e) = handle.await {
                error!("Rescan task failed: {}", e);
            }
        }

        let tasks: Vec<PersistTask> = std::mem::take(&mut *self.background.lock().await);
        for task in tasks {
            // Failures were already logged inside the task
            let _ = task.wait().await;
        }
    }

    async fn track_background(&self, task: PersistTask) {
        let mut background = self.background.lock().await;
        background.retain(|t| !t.is_finished());
        background.push(task);
    }

    /// Spawn a delayed rescan unless one is already pending
    async fn schedule_rescan(&self, filtered_out: usize) {
        let mut pending = self.pending_rescan.lock().await;
        if pending.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Rescan already pending");
            return;
        }

        let service = self.clone();
        let cancel = self.scan_token();
        let delay = millis_to_duration(self.config.rescan_delay_ms);
        *pending = Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduled rescan cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = service.rescan_tracks().await {
                        error!("Scheduled rescan failed: {}", e);
                    }
                }
            }
        }));

        self.events
            .emit_lossy(CatalogEvent::RescanScheduled { filtered_out });
    }

    /// Pull descriptors until the index is exhausted, a batch fails, the
    /// batch budget runs out, or (page 0 only) enough are gathered
    async fn fetch_batches(
        &self,
        cancel: &CancellationToken,
        start_offset: usize,
        early_exit_page: Option<usize>,
        max_batches: usize,
    ) -> Gathered {
        let batch_size = self.config.batch_size.max(1);
        let sort_order = SortOrder::parse(&self.config.sort_order);
        let mut gathered = Gathered {
            next_offset: start_offset,
            ..Default::default()
        };

        while gathered.batches < max_batches {
            if cancel.is_cancelled() {
                gathered.cancelled = true;
                break;
            }

            let batch = match self
                .media_index
                .list_audio(gathered.next_offset, batch_size, &self.config.sort_by, sort_order)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(
                        offset = gathered.next_offset,
                        "Media index batch failed, keeping {} descriptors: {}",
                        gathered.descriptors.len(),
                        e
                    );
                    gathered.finished = true;
                    break;
                }
            };

            let received = batch.len();
            gathered.batches += 1;
            gathered.next_offset += received;
            gathered.descriptors.extend(batch);
            debug!(
                offset = gathered.next_offset,
                received, "Fetched media index batch"
            );

            if received < batch_size {
                gathered.finished = true;
                break;
            }

            if let Some(page) = early_exit_page {
                if should_exit_early(
                    page,
                    gathered.descriptors.len(),
                    self.config.page_size,
                    self.config.early_exit_pages,
                ) {
                    debug!("Early exit after {} descriptors", gathered.descriptors.len());
                    break;
                }
            }
        }

        if gathered.batches >= max_batches && !gathered.finished {
            warn!("Media index batch limit ({}) reached", max_batches);
        }

        gathered
    }

    /// Filter, normalize and de-duplicate descriptors
    ///
    /// `seen_ids` carries identity across calls so a resumed walk never
    /// re-emits a track.
    async fn build_tracks(
        &self,
        descriptors: Vec<RawTrackDescriptor>,
        seen_ids: &mut HashSet<String>,
    ) -> Vec<Track> {
        let (kept, excluded) = self.filter.retain(descriptors, |d| &d.url);
        if excluded > 0 {
            debug!("Excluded {} non-music descriptors", excluded);
        }

        let mut tracks = Vec::with_capacity(kept.len());
        for descriptor in kept {
            let id = track_id(&descriptor.url);
            if !seen_ids.insert(id.clone()) {
                continue;
            }
            let artwork_color = self.colors.get_color(&descriptor.url).await;
            tracks.push(to_track(id, descriptor, artwork_color));
        }
        tracks
    }

    /// Write scanned tracks, then finish the device walk if page 0 stopped
    /// early
    async fn persist(&self, tracks: Vec<Track>, resume: Option<Resume>) -> Result<usize> {
        let mut written = self.store.upsert_tracks(&tracks).await?;

        if let Some(mut resume) = resume {
            let gathered = self
                .fetch_batches(&resume.cancel, resume.offset, None, resume.remaining_batches)
                .await;
            if gathered.cancelled {
                info!("Catalog continuation cancelled, persisting what was gathered");
            }

            let remainder = self
                .build_tracks(gathered.descriptors, &mut resume.seen_ids)
                .await;
            written += self.store.upsert_tracks(&remainder).await?;
        }

        info!("Persisted {} tracks to catalog", written);
        self.events
            .emit_lossy(CatalogEvent::TracksPersisted { count: written });
        Ok(written)
    }
}

fn to_track(id: String, descriptor: RawTrackDescriptor, artwork_color: Option<String>) -> Track {
    Track {
        id,
        title: descriptor.title,
        artist_name: descriptor.artist,
        album_name: descriptor.album,
        genre: descriptor.genre,
        duration_formatted: format_duration_ms(descriptor.duration_ms),
        artwork_uri: descriptor.cover.filter(|c| !c.is_empty()),
        artwork_color,
        last_modified: descriptor.last_modified,
        file_size: descriptor.file_size,
        source_path: descriptor.url,
    }
}
