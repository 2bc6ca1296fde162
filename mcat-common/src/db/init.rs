//! Database initialization
//!
//! The catalog database is a single shared handle opened once per process:
//! the pool is capped at one connection and that connection is never
//! recycled, so statements execute one at a time and `:memory:` databases
//! live as long as the pool.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to the catalog connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open (creating if needed) the catalog database file and ensure the schema
pub async fn open_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = single_connection_pool(options).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory catalog database with the schema in place
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = single_connection_pool(options).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

async fn single_connection_pool(options: SqliteConnectOptions) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Create all catalog tables (idempotent - safe to call on every start)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_tracks_table(pool).await?;
    create_playlists_table(pool).await?;
    create_playlist_tracks_table(pool).await?;
    create_kv_store_table(pool).await?;
    Ok(())
}

async fn create_tracks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            artist_name TEXT NOT NULL DEFAULT '',
            album_name TEXT NOT NULL DEFAULT '',
            genre TEXT NOT NULL DEFAULT '',
            duration_formatted TEXT NOT NULL DEFAULT '0:00',
            artwork_uri TEXT,
            artwork_color TEXT,
            last_modified INTEGER,
            file_size INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_title ON tracks(title)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_playlists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            cover_art TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_playlist_tracks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlist_tracks (
            playlist_id TEXT NOT NULL,
            track_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (playlist_id, track_id),
            FOREIGN KEY (playlist_id) REFERENCES playlists(id) ON DELETE CASCADE,
            FOREIGN KEY (track_id) REFERENCES tracks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_playlist_tracks_position ON playlist_tracks(playlist_id, position)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the key-value table backing the ephemeral read cache
pub async fn create_kv_store_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
