//! Exclusion filter
//!
//! Keeps non-music recordings (messaging-app audio, voice notes,
//! ringtones, notification sounds) out of the catalog. A path is excluded
//! when it contains any configured substring or matches any configured
//! pattern, both compared case-insensitively.

use mcat_common::config::ExclusionConfig;
use mcat_common::{Error, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

static DEFAULT_FILTER: Lazy<ExclusionFilter> = Lazy::new(|| {
    ExclusionFilter::from_config(&ExclusionConfig::default())
        .unwrap_or_else(|_| ExclusionFilter::empty())
});

/// Compiled exclusion rules
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    /// Lowercased substrings
    substrings: Vec<String>,
    patterns: Vec<Regex>,
}

impl ExclusionFilter {
    /// Compile rules from configuration
    pub fn from_config(config: &ExclusionConfig) -> Result<Self> {
        let substrings = config
            .substrings
            .iter()
            .map(|s| s.to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::Config(format!("Invalid exclusion pattern '{p}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            substrings,
            patterns,
        })
    }

    /// Filter that excludes nothing
    pub fn empty() -> Self {
        Self {
            substrings: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Whether a source path should be kept out of the catalog
    pub fn is_excluded(&self, path: &str) -> bool {
        let lowered = path.to_lowercase();
        self.substrings.iter().any(|s| lowered.contains(s.as_str()))
            || self.patterns.iter().any(|re| re.is_match(path))
    }

    /// Split items into kept items and the number excluded
    pub fn retain<T>(&self, items: Vec<T>, path_of: impl Fn(&T) -> &str) -> (Vec<T>, usize) {
        let before = items.len();
        let kept: Vec<T> = items
            .into_iter()
            .filter(|item| !self.is_excluded(path_of(item)))
            .collect();
        let excluded = before - kept.len();
        (kept, excluded)
    }
}

impl Default for ExclusionFilter {
    fn default() -> Self {
        DEFAULT_FILTER.clone()
    }
}
