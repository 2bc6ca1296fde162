//! Local catalog store
//!
//! Durable relational persistence for tracks and playlists. Every
//! operation returns `Result`; multi-statement mutations run inside one
//! transaction and roll back on any failure. The read-side "log and
//! default" policy lives in [`crate::boundary`], not here.

mod playlists;
mod tracks;

use mcat_common::Result;
use sqlx::SqlitePool;

/// Handle to the catalog database
///
/// Cloning shares the underlying single-connection pool.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    /// Wrap an already opened catalog database
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the catalog tables if missing (idempotent)
    pub async fn init_schema(&self) -> Result<()> {
        mcat_common::db::init_schema(&self.pool).await
    }

    /// Underlying pool, shared with the SQLite key-value store
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
