//! Key-value storage capability
//!
//! The ephemeral read cache and the color cache only need string get/set
//! and a batched delete, so they depend on [`KeyValueStore`] rather than on
//! a concrete backend.

use async_trait::async_trait;
use mcat_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::error;

/// Async string key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`
    ///
    /// # Errors
    /// `Error::QuotaExceeded` (or an error for which
    /// [`Error::is_quota_exceeded`] holds) when storage is full.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove every key in `keys`; missing keys are ignored
    async fn multi_remove(&self, keys: &[String]) -> Result<()>;
}

/// In-process key-value store with an optional byte quota
///
/// The quota counts key plus value bytes across all entries.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Keys currently stored, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;

        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(Error::QuotaExceeded(format!(
                    "{} bytes used of {}, cannot store {}",
                    used, quota, key
                )));
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Key-value store backed by the `kv_store` table of the catalog database
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Wrap `pool`, creating the `kv_store` table if missing
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        mcat_common::db::create_kv_store_table(&pool).await?;
        Ok(Self { pool })
    }
}

/// Surface SQLITE_FULL as a quota error
fn map_write_error(err: sqlx::Error) -> Error {
    let err = Error::from(err);
    if err.is_quota_exceeded() {
        Error::QuotaExceeded(err.to_string())
    } else {
        err
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM kv_store WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await
                .inspect_err(|e| error!("Failed to remove cache key {}: {}", key, e))?;
        }
        tx.commit().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcat_common::db::open_in_memory;

    #[tokio::test]
    async fn test_memory_store_basic_ops() {
        let kv = MemoryKvStore::new();
        assert_eq!(kv.get_item("a").await.unwrap(), None);

        kv.set_item("a", "1").await.unwrap();
        kv.set_item("b", "2").await.unwrap();
        kv.set_item("a", "3").await.unwrap();
        assert_eq!(kv.get_item("a").await.unwrap().as_deref(), Some("3"));
        assert_eq!(kv.len().await, 2);

        kv.multi_remove(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert!(!kv.contains_key("a").await);
        assert_eq!(kv.keys().await, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_store_quota() {
        let kv = MemoryKvStore::with_quota(10);
        kv.set_item("k1", "12345").await.unwrap(); // 7 bytes

        let err = kv.set_item("k2", "123").await.unwrap_err();
        assert!(err.is_quota_exceeded());
        assert!(!kv.contains_key("k2").await);

        // Overwriting an existing key only counts the new value
        kv.set_item("k1", "12345678").await.unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let pool = open_in_memory().await.unwrap();
        let kv = SqliteKvStore::new(pool).await.unwrap();

        kv.set_item("song_cache_timestamp", "42").await.unwrap();
        kv.set_item("song_cache_timestamp", "43").await.unwrap();
        kv.set_item("other", "x").await.unwrap();
        assert_eq!(
            kv.get_item("song_cache_timestamp").await.unwrap().as_deref(),
            Some("43")
        );

        kv.multi_remove(&["song_cache_timestamp".to_string()])
            .await
            .unwrap();
        assert_eq!(kv.get_item("song_cache_timestamp").await.unwrap(), None);
        assert_eq!(kv.get_item("other").await.unwrap().as_deref(), Some("x"));
    }
}
