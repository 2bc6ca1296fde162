//! Artwork color cache capability
//!
//! Dominant artwork colors are computed elsewhere; the scan service only
//! looks them up by the descriptor's original path.

use crate::cache::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Key prefix for colors kept in a key-value store
const COLOR_KEY_PREFIX: &str = "color:";

/// Lookup/store of cached artwork colors keyed by original source path
#[async_trait]
pub trait ColorCache: Send + Sync {
    async fn get_color(&self, key: &str) -> Option<String>;
    async fn store_color(&self, key: &str, color: &str);
}

/// Process-local color cache
#[derive(Debug, Default)]
pub struct MemoryColorCache {
    colors: RwLock<HashMap<String, String>>,
}

impl MemoryColorCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ColorCache for MemoryColorCache {
    async fn get_color(&self, key: &str) -> Option<String> {
        self.colors.read().await.get(key).cloned()
    }

    async fn store_color(&self, key: &str, color: &str) {
        self.colors
            .write()
            .await
            .insert(key.to_string(), color.to_string());
    }
}

/// Color cache persisted in a [`KeyValueStore`]
///
/// Lookups are best-effort: storage errors read as "no color".
pub struct KvColorCache {
    kv: Arc<dyn KeyValueStore>,
}

impl KvColorCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl ColorCache for KvColorCache {
    async fn get_color(&self, key: &str) -> Option<String> {
        match self.kv.get_item(&format!("{COLOR_KEY_PREFIX}{key}")).await {
            Ok(color) => color,
            Err(e) => {
                warn!(key, "Color lookup failed: {}", e);
                None
            }
        }
    }

    async fn store_color(&self, key: &str, color: &str) {
        if let Err(e) = self
            .kv
            .set_item(&format!("{COLOR_KEY_PREFIX}{key}"), color)
            .await
        {
            warn!(key, "Color store failed: {}", e);
        }
    }
}
