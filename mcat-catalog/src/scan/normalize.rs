//! Source path normalization and track identity

use sha2::{Digest, Sha256};

/// Hex characters of the path digest kept as the track id
const TRACK_ID_LEN: usize = 16;

/// Canonical form of a device file path or URI
///
/// Strips a `file://` scheme, percent-decodes, unifies separators,
/// collapses repeated slashes, drops a trailing slash and lowercases, so
/// the same file reported in slightly different spellings maps to one key.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let without_scheme = trimmed
        .strip_prefix("file://")
        .or_else(|| trimmed.strip_prefix("FILE://"))
        .unwrap_or(trimmed);

    let decoded = urlencoding::decode(without_scheme)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| without_scheme.to_string());

    let mut normalized = String::with_capacity(decoded.len());
    let mut previous_slash = false;
    for c in decoded.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        normalized.extend(c.to_lowercase());
    }

    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Deterministic track id for a source path
///
/// Identity, not security: the id is a truncated SHA-256 of the
/// normalized path and collisions are tolerated.
pub fn track_id(source_path: &str) -> String {
    let digest = Sha256::digest(normalize_path(source_path).as_bytes());
    let hex = format!("{:x}", digest);
    hex[..TRACK_ID_LEN].to_string()
}
