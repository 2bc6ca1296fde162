//! Track queries

use super::CatalogStore;
use mcat_common::db::{Track, TrackPage};
use mcat_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, error, info};

/// Column list shared by every query that materializes a [`Track`]
pub(crate) const TRACK_COLUMNS: &str = "t.id, t.source_path, t.title, t.artist_name, t.album_name, \
     t.genre, t.duration_formatted, t.artwork_uri, t.artwork_color, t.last_modified, t.file_size";

pub(crate) fn track_from_row(row: &SqliteRow) -> std::result::Result<Track, sqlx::Error> {
    Ok(Track {
        id: row.try_get("id")?,
        source_path: row.try_get("source_path")?,
        title: row.try_get("title")?,
        artist_name: row.try_get("artist_name")?,
        album_name: row.try_get("album_name")?,
        genre: row.try_get("genre")?,
        duration_formatted: row.try_get("duration_formatted")?,
        artwork_uri: row.try_get("artwork_uri")?,
        artwork_color: row.try_get("artwork_color")?,
        last_modified: row.try_get("last_modified")?,
        file_size: row.try_get("file_size")?,
    })
}

impl CatalogStore {
    /// Insert or replace tracks by id in a single transaction
    ///
    /// Either the whole batch lands or none of it does. Existing rows are
    /// updated in place, so playlist membership pointing at them is kept.
    pub async fn upsert_tracks(&self, tracks: &[Track]) -> Result<usize> {
        if tracks.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for track in tracks {
            let result = sqlx::query(
                r#"
                INSERT INTO tracks (
                    id, source_path, title, artist_name, album_name, genre,
                    duration_formatted, artwork_uri, artwork_color, last_modified, file_size
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source_path = excluded.source_path,
                    title = excluded.title,
                    artist_name = excluded.artist_name,
                    album_name = excluded.album_name,
                    genre = excluded.genre,
                    duration_formatted = excluded.duration_formatted,
                    artwork_uri = excluded.artwork_uri,
                    artwork_color = excluded.artwork_color,
                    last_modified = excluded.last_modified,
                    file_size = excluded.file_size
                "#,
            )
            .bind(&track.id)
            .bind(&track.source_path)
            .bind(&track.title)
            .bind(&track.artist_name)
            .bind(&track.album_name)
            .bind(&track.genre)
            .bind(&track.duration_formatted)
            .bind(&track.artwork_uri)
            .bind(&track.artwork_color)
            .bind(track.last_modified)
            .bind(track.file_size)
            .execute(&mut *tx)
            .await;

            if let Err(e) = result {
                error!(track_id = %track.id, "Track upsert failed, rolling back batch: {}", e);
                tx.rollback().await?;
                return Err(e.into());
            }
        }

        tx.commit().await?;
        debug!("Upserted {} tracks", tracks.len());
        Ok(tracks.len())
    }

    /// All tracks ordered by title
    pub async fn get_all_tracks(&self) -> Result<Vec<Track>> {
        let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks t ORDER BY t.title, t.id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let tracks = rows
            .iter()
            .map(track_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// One page of tracks ordered by title, with the total row count
    pub async fn get_tracks_page(&self, page: usize, page_size: usize) -> Result<TrackPage> {
        let total = self.count_tracks().await?;

        // A page past any addressable row is simply empty
        let Some(offset) = page
            .checked_mul(page_size)
            .and_then(|offset| i64::try_from(offset).ok())
        else {
            return Ok(TrackPage {
                tracks: Vec::new(),
                has_more: false,
                total,
            });
        };

        let sql = format!(
            "SELECT {TRACK_COLUMNS} FROM tracks t ORDER BY t.title, t.id LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(page_size).unwrap_or(i64::MAX))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let tracks = rows
            .iter()
            .map(track_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(TrackPage {
            tracks,
            has_more: page.saturating_add(1).saturating_mul(page_size) < total,
            total,
        })
    }

    /// Single track by id
    pub async fn get_track_by_id(&self, id: &str) -> Result<Option<Track>> {
        let sql = format!("SELECT {TRACK_COLUMNS} FROM tracks t WHERE t.id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        Ok(row.as_ref().map(track_from_row).transpose()?)
    }

    /// Number of catalog tracks
    pub async fn count_tracks(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Whether the catalog holds any track at all
    pub async fn has_any_tracks(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tracks)")
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Delete every track row
    ///
    /// Foreign-key enforcement is suspended for the delete so playlist
    /// membership survives; track ids are path-derived and come back on
    /// the following scan. Members that do not come back are removed by
    /// [`prune_missing_members`](Self::prune_missing_members).
    pub async fn clear_tracks(&self) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await?;

        let deleted = sqlx::query("DELETE FROM tracks").execute(&mut *conn).await;

        // Re-enable before surfacing any delete error
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *conn)
            .await?;

        let deleted = deleted?.rows_affected();
        info!("Cleared {} tracks from catalog", deleted);
        Ok(deleted)
    }
}
