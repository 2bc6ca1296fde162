//! Playlist queries
//!
//! Membership positions are kept as a dense `0..N-1` sequence per playlist.
//! Every mutation below runs in one transaction; an early return drops the
//! transaction, which rolls it back.

use super::tracks::{track_from_row, TRACK_COLUMNS};
use super::CatalogStore;
use mcat_common::db::{NewPlaylist, Playlist, Track};
use mcat_common::time::now_ms;
use mcat_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Playlist columns with the cover-art fallback to the first member's artwork
const PLAYLIST_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.created_at, p.updated_at,
           COALESCE(
               p.cover_art,
               (SELECT t.artwork_uri
                  FROM playlist_tracks pt
                  JOIN tracks t ON t.id = pt.track_id
                 WHERE pt.playlist_id = p.id
                 ORDER BY pt.position
                 LIMIT 1)
           ) AS cover_art
      FROM playlists p
"#;

/// Time-ordered id with a random suffix, e.g. `pl_18c2f3a9b10e3f4a1c2`
fn generate_playlist_id(now: i64) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("pl_{:x}{}", now, &random[..8])
}

/// Drop repeated ids, keeping the first occurrence
///
/// The (playlist, track) key is unique, so a repeated id would otherwise be
/// ignored on insert and leave a hole in the positions.
fn dedup_track_ids(track_ids: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    track_ids
        .iter()
        .map(String::as_str)
        .filter(|id| seen.insert(*id))
        .collect()
}

fn playlist_from_row(
    row: &SqliteRow,
    track_ids: Vec<String>,
) -> std::result::Result<Playlist, sqlx::Error> {
    Ok(Playlist {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        cover_art: row.try_get("cover_art")?,
        track_ids,
    })
}

/// Insert membership rows at positions `0..N-1`
async fn insert_members(
    tx: &mut Transaction<'_, Sqlite>,
    playlist_id: &str,
    track_ids: &[String],
) -> Result<()> {
    for (position, track_id) in dedup_track_ids(track_ids).into_iter().enumerate() {
        sqlx::query(
            "INSERT INTO playlist_tracks (playlist_id, track_id, position) VALUES (?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(track_id)
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn playlist_exists(tx: &mut Transaction<'_, Sqlite>, playlist_id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM playlists WHERE id = ?)")
        .bind(playlist_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(exists)
}

async fn touch_playlist(
    tx: &mut Transaction<'_, Sqlite>,
    playlist_id: &str,
    now: i64,
) -> Result<()> {
    sqlx::query("UPDATE playlists SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(playlist_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

impl CatalogStore {
    /// Create a playlist with its initial members
    pub async fn create_playlist(&self, data: &NewPlaylist) -> Result<Playlist> {
        let now = now_ms();
        let id = generate_playlist_id(now);

        self.insert_playlist(&id, data, now)
            .await
            .inspect_err(|e| error!(playlist = %data.name, "Create playlist failed: {}", e))?;

        info!(playlist_id = %id, "Created playlist '{}'", data.name);

        self.get_playlist_by_id(&id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Playlist {id} missing after insert")))
    }

    async fn insert_playlist(&self, id: &str, data: &NewPlaylist, now: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO playlists (id, name, description, created_at, updated_at, cover_art)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(now)
        .bind(now)
        .bind(&data.cover_art)
        .execute(&mut *tx)
        .await?;

        insert_members(&mut tx, id, &data.track_ids).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Replace playlist metadata and its entire membership set
    ///
    /// Last writer wins; there is no version check.
    pub async fn update_playlist(&self, playlist: &Playlist) -> Result<()> {
        self.replace_playlist(playlist)
            .await
            .inspect_err(|e| error!(playlist_id = %playlist.id, "Update playlist failed: {}", e))
    }

    async fn replace_playlist(&self, playlist: &Playlist) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let stored: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT p.cover_art,
                   (SELECT t.artwork_uri
                      FROM playlist_tracks pt
                      JOIN tracks t ON t.id = pt.track_id
                     WHERE pt.playlist_id = p.id
                     ORDER BY pt.position
                     LIMIT 1)
              FROM playlists p
             WHERE p.id = ?
            "#,
        )
        .bind(&playlist.id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((explicit_cover, fallback_cover)) = stored else {
            return Err(Error::NotFound(format!("playlist {}", playlist.id)));
        };

        // A cover the caller only saw through the first-track fallback is
        // not promoted to an explicit cover.
        let cover_art = if explicit_cover.is_none() && playlist.cover_art == fallback_cover {
            None
        } else {
            playlist.cover_art.clone()
        };

        sqlx::query(
            "UPDATE playlists SET name = ?, description = ?, cover_art = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&playlist.name)
        .bind(&playlist.description)
        .bind(&cover_art)
        .bind(now_ms())
        .bind(&playlist.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = ?")
            .bind(&playlist.id)
            .execute(&mut *tx)
            .await?;

        insert_members(&mut tx, &playlist.id, &playlist.track_ids).await?;

        tx.commit().await?;
        debug!(playlist_id = %playlist.id, "Updated playlist");
        Ok(())
    }

    /// Delete a playlist and its membership rows; tracks are untouched
    ///
    /// Returns whether the playlist existed.
    pub async fn delete_playlist(&self, playlist_id: &str) -> Result<bool> {
        self.remove_playlist(playlist_id)
            .await
            .inspect_err(|e| error!(playlist_id, "Delete playlist failed: {}", e))
    }

    async fn remove_playlist(&self, playlist_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM playlists WHERE id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    /// All playlists with their ordered track ids
    pub async fn get_playlists(&self) -> Result<Vec<Playlist>> {
        let sql = format!("{PLAYLIST_SELECT} ORDER BY p.created_at, p.id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let members: Vec<(String, String)> = sqlx::query_as(
            "SELECT playlist_id, track_id FROM playlist_tracks ORDER BY playlist_id, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_playlist: HashMap<String, Vec<String>> = HashMap::new();
        for (playlist_id, track_id) in members {
            by_playlist.entry(playlist_id).or_default().push(track_id);
        }

        let mut playlists = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            let track_ids = by_playlist.remove(&id).unwrap_or_default();
            playlists.push(playlist_from_row(row, track_ids)?);
        }
        Ok(playlists)
    }

    /// Single playlist with its ordered track ids
    pub async fn get_playlist_by_id(&self, playlist_id: &str) -> Result<Option<Playlist>> {
        let sql = format!("{PLAYLIST_SELECT} WHERE p.id = ?");
        let Some(row) = sqlx::query(&sql)
            .bind(playlist_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let track_ids: Vec<String> = sqlx::query_scalar(
            "SELECT track_id FROM playlist_tracks WHERE playlist_id = ? ORDER BY position",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(playlist_from_row(&row, track_ids)?))
    }

    /// Member tracks in playlist order
    ///
    /// Members whose track row is currently absent (e.g. mid-rescan) are
    /// skipped.
    pub async fn get_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        let sql = format!(
            "SELECT {TRACK_COLUMNS} FROM playlist_tracks pt \
             JOIN tracks t ON t.id = pt.track_id \
             WHERE pt.playlist_id = ? ORDER BY pt.position"
        );
        let rows = sqlx::query(&sql)
            .bind(playlist_id)
            .fetch_all(&self.pool)
            .await?;

        let tracks = rows
            .iter()
            .map(track_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Append a track at the end of a playlist
    ///
    /// Re-adding an existing member is a no-op and returns `false`.
    pub async fn add_track_to_playlist(&self, playlist_id: &str, track_id: &str) -> Result<bool> {
        self.append_member(playlist_id, track_id)
            .await
            .inspect_err(|e| error!(playlist_id, track_id, "Add to playlist failed: {}", e))
    }

    async fn append_member(&self, playlist_id: &str, track_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let next_position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM playlist_tracks WHERE playlist_id = ?",
        )
        .bind(playlist_id)
        .fetch_one(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO playlist_tracks (playlist_id, track_id, position) VALUES (?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(track_id)
        .bind(next_position)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            touch_playlist(&mut tx, playlist_id, now_ms()).await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Remove a member and close the gap it leaves
    ///
    /// Returns `false` if the track was not a member.
    pub async fn remove_track_from_playlist(
        &self,
        playlist_id: &str,
        track_id: &str,
    ) -> Result<bool> {
        self.remove_member(playlist_id, track_id)
            .await
            .inspect_err(|e| error!(playlist_id, track_id, "Remove from playlist failed: {}", e))
    }

    async fn remove_member(&self, playlist_id: &str, track_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let position: Option<i64> = sqlx::query_scalar(
            "SELECT position FROM playlist_tracks WHERE playlist_id = ? AND track_id = ?",
        )
        .bind(playlist_id)
        .bind(track_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(position) = position else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = ? AND track_id = ?")
            .bind(playlist_id)
            .bind(track_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE playlist_tracks SET position = position - 1 WHERE playlist_id = ? AND position > ?",
        )
        .bind(playlist_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;

        touch_playlist(&mut tx, playlist_id, now_ms()).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Replace the ordered membership set
    pub async fn reorder_playlist_tracks(
        &self,
        playlist_id: &str,
        ordered_track_ids: &[String],
    ) -> Result<()> {
        self.rewrite_members(playlist_id, ordered_track_ids)
            .await
            .inspect_err(|e| error!(playlist_id, "Reorder playlist failed: {}", e))
    }

    async fn rewrite_members(&self, playlist_id: &str, ordered_track_ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if !playlist_exists(&mut tx, playlist_id).await? {
            return Err(Error::NotFound(format!("playlist {playlist_id}")));
        }

        sqlx::query("DELETE FROM playlist_tracks WHERE playlist_id = ?")
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        insert_members(&mut tx, playlist_id, ordered_track_ids).await?;
        touch_playlist(&mut tx, playlist_id, now_ms()).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Drop memberships whose track is no longer in the catalog
    ///
    /// Run after a rescan has written the catalog back. Affected playlists
    /// get their positions renumbered to `0..N-1`. Returns the rows removed.
    pub async fn prune_missing_members(&self) -> Result<u64> {
        self.delete_missing_members()
            .await
            .inspect_err(|e| error!("Pruning playlist members failed: {}", e))
    }

    async fn delete_missing_members(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let affected: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT playlist_id FROM playlist_tracks
             WHERE track_id NOT IN (SELECT id FROM tracks)
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        if affected.is_empty() {
            return Ok(0);
        }

        let removed = sqlx::query(
            "DELETE FROM playlist_tracks WHERE track_id NOT IN (SELECT id FROM tracks)",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let now = now_ms();
        for playlist_id in &affected {
            let remaining: Vec<String> = sqlx::query_scalar(
                "SELECT track_id FROM playlist_tracks WHERE playlist_id = ? ORDER BY position",
            )
            .bind(playlist_id)
            .fetch_all(&mut *tx)
            .await?;

            for (position, track_id) in remaining.iter().enumerate() {
                sqlx::query(
                    "UPDATE playlist_tracks SET position = ? WHERE playlist_id = ? AND track_id = ?",
                )
                .bind(position as i64)
                .bind(playlist_id)
                .bind(track_id)
                .execute(&mut *tx)
                .await?;
            }

            touch_playlist(&mut tx, playlist_id, now).await?;
        }

        tx.commit().await?;

        info!(
            playlists = affected.len(),
            "Removed {} playlist members missing from the catalog", removed
        );
        Ok(removed)
    }
}
