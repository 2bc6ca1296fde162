//! mcat - local music catalog command line
//!
//! Composition root: every collaborator is built here and passed down
//! explicitly.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mcat_catalog::scan::KvColorCache;
use mcat_catalog::{
    CatalogReads, CatalogStore, ExclusionFilter, FsMediaIndex, KeyValueStore, ScanService,
    SongCache, SqliteKvStore,
};
use mcat_common::config::CatalogConfig;
use mcat_common::db::{open_database, NewPlaylist, Track};
use mcat_common::{CatalogEvent, EventBus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "mcat")]
#[command(about = "Local music catalog: scan, page, cache and playlists")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "MCAT_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog database file
    #[arg(short, long, env = "MCAT_DB")]
    database: Option<PathBuf>,

    /// Music directory to index (repeatable, added to the configured ones)
    #[arg(short, long = "music-dir")]
    music_dirs: Vec<String>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List one page of tracks
    Tracks {
        #[arg(short, long, default_value = "0")]
        page: usize,
    },
    /// Clear the catalog and rebuild it from the music directories
    Rescan,
    /// List playlists
    Playlists,
    /// Create a playlist
    PlaylistCreate {
        name: String,
        track_ids: Vec<String>,
    },
    /// Append a track to a playlist
    PlaylistAdd { playlist: String, track: String },
    /// Remove a track from a playlist
    PlaylistRemove { playlist: String, track: String },
    /// Show a playlist and its tracks in order
    PlaylistShow { playlist: String },
    /// Delete a playlist
    PlaylistDelete { playlist: String },
    /// Drop the ephemeral read cache
    CacheClear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting mcat v{}", env!("CARGO_PKG_VERSION"));

    let mut config = CatalogConfig::load(args.config.as_deref())?;
    config.scan.music_directories.extend(args.music_dirs.iter().cloned());
    if config.scan.music_directories.is_empty() {
        warn!("No music directories configured; device scans will find nothing");
    }

    let db_path = config.resolve_database_path(args.database.as_deref());
    info!("Database path: {}", db_path.display());
    let pool = open_database(&db_path).await?;

    let store = CatalogStore::new(pool.clone());
    let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKvStore::new(pool).await?);
    let events = EventBus::default();
    let song_cache = SongCache::new(kv.clone(), config.cache.clone()).with_events(events.clone());

    let media_index = Arc::new(FsMediaIndex::new(
        config
            .scan
            .music_directories
            .iter()
            .map(PathBuf::from)
            .collect(),
    ));
    let scan = ScanService::new(
        store.clone(),
        media_index,
        Arc::new(KvColorCache::new(kv)),
        config.scan.clone(),
        ExclusionFilter::from_config(&config.exclusion)?,
        events.clone(),
    );
    let reads = CatalogReads::new(store.clone());

    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            debug!(?event, "Catalog event");
        }
    });

    match args.command {
        Command::Tracks { page } => {
            if page == 0 {
                if let Some(cached) = song_cache.get_cached_songs().await {
                    info!("Serving {} tracks from cache", cached.len());
                    let tracks: Vec<Track> = cached.into_iter().map(Track::from).collect();
                    print_tracks(&tracks, 0);
                    println!();
                }
            }

            let loaded = reads.load_tracks(&scan, page).await?;
            print_tracks(&loaded.tracks, page.saturating_mul(config.scan.page_size));
            println!(
                "page {} - {} tracks{}",
                page,
                loaded.tracks.len(),
                if loaded.has_more { ", more available" } else { "" }
            );

            scan.wait_for_background().await;
            if page == 0 {
                let all = reads.get_all_tracks().await;
                let source = if all.is_empty() { &loaded.tracks } else { &all };
                song_cache.cache_songs(source).await;
            }
        }
        Command::Rescan => {
            let first = scan.rescan_tracks().await?;
            scan.wait_for_background().await;
            let total = reads.count_tracks().await;
            song_cache.cache_songs(&reads.get_all_tracks().await).await;
            println!(
                "rescanned {} tracks ({} on first page)",
                total,
                first.tracks.len()
            );
        }
        Command::Playlists => {
            for playlist in reads.get_playlists().await {
                println!(
                    "{}\t{}\t{} tracks",
                    playlist.id,
                    playlist.name,
                    playlist.track_ids.len()
                );
            }
        }
        Command::PlaylistCreate { name, track_ids } => {
            let playlist = store
                .create_playlist(&NewPlaylist {
                    name,
                    track_ids,
                    ..Default::default()
                })
                .await?;
            events.emit_lossy(CatalogEvent::PlaylistChanged {
                playlist_id: playlist.id.clone(),
            });
            println!("{}", playlist.id);
        }
        Command::PlaylistAdd { playlist, track } => {
            let added = store.add_track_to_playlist(&playlist, &track).await?;
            if added {
                events.emit_lossy(CatalogEvent::PlaylistChanged { playlist_id: playlist });
            }
            println!("{}", if added { "added" } else { "already present" });
        }
        Command::PlaylistRemove { playlist, track } => {
            let removed = store.remove_track_from_playlist(&playlist, &track).await?;
            if removed {
                events.emit_lossy(CatalogEvent::PlaylistChanged { playlist_id: playlist });
            }
            println!("{}", if removed { "removed" } else { "not a member" });
        }
        Command::PlaylistShow { playlist } => match reads.get_playlist_by_id(&playlist).await {
            Some(found) => {
                println!("{} ({})", found.name, found.id);
                if let Some(description) = &found.description {
                    println!("{}", description);
                }
                print_tracks(&reads.get_playlist_tracks(&playlist).await, 0);
            }
            None => println!("no playlist {}", playlist),
        },
        Command::PlaylistDelete { playlist } => {
            let deleted = store.delete_playlist(&playlist).await?;
            if deleted {
                events.emit_lossy(CatalogEvent::PlaylistChanged { playlist_id: playlist });
            }
            println!("{}", if deleted { "deleted" } else { "not found" });
        }
        Command::CacheClear => {
            song_cache.clear_cache().await;
            println!("cache cleared");
        }
    }

    Ok(())
}

fn print_tracks(tracks: &[Track], first_index: usize) {
    for (offset, track) in tracks.iter().enumerate() {
        println!(
            "{:>5}  {}  {:>6}  {} - {}",
            first_index.saturating_add(offset + 1),
            track.id,
            track.duration_formatted,
            track.artist_name,
            track.title
        );
    }
}
