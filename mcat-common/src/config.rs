//! Configuration loading and database path resolution
//!
//! Configuration is read from a TOML file. Every field has a compiled
//! default, so a missing or partial file never prevents startup.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MCAT_CONFIG";

/// Environment variable naming an explicit database file
pub const DATABASE_ENV_VAR: &str = "MCAT_DB";

/// Top-level catalog configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Database file; falls back to the platform data directory
    pub database_path: Option<PathBuf>,
    pub scan: ScanConfig,
    pub exclusion: ExclusionConfig,
    pub cache: CacheConfig,
}

/// Scan/reconcile tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Tracks per catalog page
    pub page_size: usize,
    /// Descriptors requested from the media index per call
    pub batch_size: usize,
    /// Safety bound on media index calls per scan
    pub max_batches: usize,
    /// Page 0 stops scanning once this many pages' worth are gathered
    pub early_exit_pages: usize,
    /// Filtered-out count on page 0 above which a rescan is scheduled
    pub rescan_filter_threshold: usize,
    /// Delay before a scheduled rescan runs
    pub rescan_delay_ms: u64,
    /// Directories probed during a rescan
    pub music_directories: Vec<String>,
    /// Media index sort key
    pub sort_by: String,
    /// Media index sort order ("asc" or "desc")
    pub sort_order: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            batch_size: 500,
            max_batches: 20,
            early_exit_pages: 2,
            rescan_filter_threshold: 10,
            rescan_delay_ms: 2000,
            music_directories: Vec::new(),
            sort_by: "title".to_string(),
            sort_order: "asc".to_string(),
        }
    }
}

/// Rules that keep non-music recordings out of the catalog
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    /// Case-insensitive path substrings
    pub substrings: Vec<String>,
    /// Case-insensitive regular expressions matched against the path
    pub patterns: Vec<String>,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        let substrings = [
            "/whatsapp/",
            "/telegram/",
            "/viber/",
            "/signal/",
            "voice notes",
            "voice_notes",
            "voicenotes",
            "/recordings/",
            "call_recordings",
            "/ringtones/",
            "/notifications/",
            "/alarms/",
            "ringtone",
            "notification",
        ];

        Self {
            substrings: substrings.iter().map(|s| s.to_string()).collect(),
            // WhatsApp voice notes: AUD-20230101-WA0001, PTT-20230101-WA0001
            patterns: vec![r"(aud|ptt)-\d{8}-wa\d{4}".to_string()],
        }
    }
}

/// Ephemeral read cache limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Tracks per stored chunk
    pub chunk_size: usize,
    /// Maximum number of chunks kept
    pub max_chunks: usize,
    /// Age after which the whole cache is discarded
    pub ttl_ms: i64,
    /// Chunks fetched concurrently per read batch
    pub read_batch_width: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            max_chunks: 20,
            ttl_ms: 24 * 60 * 60 * 1000,
            read_batch_width: 5,
        }
    }
}

impl CatalogConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration following the resolution order:
    /// 1. Command-line argument (highest priority)
    /// 2. `MCAT_CONFIG` environment variable
    /// 3. `<config_dir>/mcat/config.toml`
    /// 4. Compiled defaults
    ///
    /// An explicitly named file that fails to parse is an error; a missing
    /// default file is not.
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_arg {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        if let Some(path) = default_config_file() {
            if path.exists() {
                info!("Loading configuration from {}", path.display());
                return Self::from_file(&path);
            }
        }

        warn!("No configuration file found, using compiled defaults");
        Ok(Self::default())
    }

    /// Resolve the database path:
    /// 1. Command-line argument
    /// 2. `MCAT_DB` environment variable
    /// 3. `database_path` from the config file
    /// 4. `<data_dir>/mcat/catalog.db`
    pub fn resolve_database_path(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            return PathBuf::from(path);
        }

        if let Some(path) = &self.database_path {
            return path.clone();
        }

        default_data_dir().join("catalog.db")
    }
}

fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mcat").join("config.toml"))
}

/// OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mcat"))
        .unwrap_or_else(|| PathBuf::from("./mcat_data"))
}
