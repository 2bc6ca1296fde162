//! Filesystem-backed media index
//!
//! Stands in for the OS media library on desktop hosts: walks the
//! configured music directories, keeps files with audio extensions and
//! reads tags with lofty. The sorted listing is built when a query starts
//! at offset 0 and reused for the following windows of the same scan.
//!
//! The walk itself only stats files. Tags are read for the window being
//! served, unless the sort key is a tag (title, artist, album), in which
//! case the whole listing is tagged before sorting. Tag reads are kept
//! across listings and reused while a file's size and mtime are unchanged.

use super::media_index::{MediaIndex, RawTrackDescriptor, SortOrder};
use async_trait::async_trait;
use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use lofty::probe::Probe;
use mcat_common::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions treated as audio
pub const AUDIO_EXTENSIONS: [&str; 9] = [
    "mp3", "flac", "ogg", "opus", "m4a", "aac", "wav", "wma", "aiff",
];

/// Tagged descriptors by path
type TagCache = Arc<std::sync::Mutex<HashMap<String, RawTrackDescriptor>>>;

/// One audio file of the current listing
#[derive(Debug, Clone)]
struct ListedFile {
    descriptor: RawTrackDescriptor,
    /// Tags have been read (or found unreadable)
    tagged: bool,
}

/// Media index over local directories
pub struct FsMediaIndex {
    roots: Vec<PathBuf>,
    listing: Mutex<Option<Vec<ListedFile>>>,
    tags: TagCache,
}

impl FsMediaIndex {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            listing: Mutex::new(None),
            tags: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Configured root directories
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    async fn build_listing(&self, sort_by: &str, sort_order: SortOrder) -> Result<Vec<ListedFile>> {
        let roots = self.roots.clone();
        let sort_by = sort_by.to_string();
        let tags = self.tags.clone();

        tokio::task::spawn_blocking(move || {
            let mut files: Vec<ListedFile> = roots
                .iter()
                .flat_map(|root| collect_audio_files(root))
                .map(|path| ListedFile {
                    descriptor: stat_file(&path),
                    tagged: false,
                })
                .collect();

            if sorts_by_tag(&sort_by) {
                for file in &mut files {
                    tag_file(file, &tags);
                }
            }

            sort_listing(&mut files, &sort_by, sort_order);
            files
        })
        .await
        .map_err(|e| Error::Internal(format!("Media walk task failed: {e}")))
    }
}

/// Recursively collect audio files under `root`
///
/// Unreadable entries are logged and skipped.
pub fn collect_audio_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && is_audio_file(entry.path()) {
                    files.push(entry.path().to_path_buf());
                }
            }
            Err(e) => {
                warn!("Error accessing entry: {}", e);
            }
        }
    }

    files
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

fn sorts_by_tag(sort_by: &str) -> bool {
    matches!(sort_by, "title" | "artist" | "album")
}

/// Descriptor from file metadata alone, titled after the file stem
fn stat_file(path: &Path) -> RawTrackDescriptor {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut descriptor = RawTrackDescriptor {
        url: path.to_string_lossy().to_string(),
        title: stem,
        ..Default::default()
    };

    if let Ok(metadata) = std::fs::metadata(path) {
        descriptor.file_size = Some(metadata.len() as i64);
        descriptor.last_modified = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);
    }

    descriptor
}

/// Fill duration and tag fields; unreadable tags leave the stat fields
fn read_tags(descriptor: &mut RawTrackDescriptor) {
    let path = Path::new(&descriptor.url);
    let tagged_file = match Probe::open(path).and_then(|probe| probe.read()) {
        Ok(file) => file,
        Err(e) => {
            debug!(file = %path.display(), "No readable tags: {}", e);
            return;
        }
    };

    descriptor.duration_ms = tagged_file.properties().duration().as_millis() as i64;

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        if let Some(title) = tag.title().filter(|t| !t.trim().is_empty()) {
            descriptor.title = title.to_string();
        }
        descriptor.artist = tag.artist().map(|s| s.to_string()).unwrap_or_default();
        descriptor.album = tag.album().map(|s| s.to_string()).unwrap_or_default();
        descriptor.genre = tag.genre().map(|s| s.to_string()).unwrap_or_default();
    }
}

/// Tag one listed file, reusing an earlier read of the same file version
fn tag_file(file: &mut ListedFile, tags: &TagCache) {
    if file.tagged {
        return;
    }

    let mut cache = tags.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let fresh = cache.get(&file.descriptor.url).filter(|cached| {
        cached.last_modified == file.descriptor.last_modified
            && cached.file_size == file.descriptor.file_size
    });

    match fresh {
        Some(cached) => file.descriptor = cached.clone(),
        None => {
            read_tags(&mut file.descriptor);
            cache.insert(file.descriptor.url.clone(), file.descriptor.clone());
        }
    }
    file.tagged = true;
}

fn sort_listing(files: &mut [ListedFile], sort_by: &str, order: SortOrder) {
    match sort_by {
        "title" => files.sort_by_cached_key(|f| {
            (f.descriptor.title.to_lowercase(), f.descriptor.url.clone())
        }),
        "artist" => files.sort_by_cached_key(|f| {
            (f.descriptor.artist.to_lowercase(), f.descriptor.url.clone())
        }),
        "album" => files.sort_by_cached_key(|f| {
            (f.descriptor.album.to_lowercase(), f.descriptor.url.clone())
        }),
        "modified" => {
            files.sort_by_key(|f| (f.descriptor.last_modified, f.descriptor.url.clone()))
        }
        _ => files.sort_by(|a, b| a.descriptor.url.cmp(&b.descriptor.url)),
    }

    if order == SortOrder::Descending {
        files.reverse();
    }
}

#[async_trait]
impl MediaIndex for FsMediaIndex {
    async fn request_permission(&self) -> Result<bool> {
        Ok(self.roots.iter().any(|root| std::fs::read_dir(root).is_ok()))
    }

    async fn list_audio(
        &self,
        offset: usize,
        limit: usize,
        sort_by: &str,
        sort_order: SortOrder,
    ) -> Result<Vec<RawTrackDescriptor>> {
        let mut listing = self.listing.lock().await;

        if offset == 0 || listing.is_none() {
            *listing = Some(self.build_listing(sort_by, sort_order).await?);
        }

        let Some(files) = listing.as_mut() else {
            return Ok(Vec::new());
        };
        let start = offset.min(files.len());
        let end = start.saturating_add(limit).min(files.len());
        let window = &mut files[start..end];

        if window.iter().any(|f| !f.tagged) {
            let pending = window.to_vec();
            let tags = self.tags.clone();
            let tagged = tokio::task::spawn_blocking(move || {
                pending
                    .into_iter()
                    .map(|mut file| {
                        tag_file(&mut file, &tags);
                        file
                    })
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(|e| Error::Internal(format!("Tag read task failed: {e}")))?;
            window.clone_from_slice(&tagged);
        }

        Ok(window.iter().map(|f| f.descriptor.clone()).collect())
    }

    async fn probe_directory(&self, directory: &str) -> Result<()> {
        std::fs::read_dir(directory)?;
        *self.listing.lock().await = None;
        Ok(())
    }
}
