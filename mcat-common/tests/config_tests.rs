//! Configuration loading tests
//!
//! Uses serial_test to prevent environment variable races: tests that
//! set MCAT_CONFIG or MCAT_DB are marked #[serial].

use mcat_common::config::{CatalogConfig, CONFIG_ENV_VAR, DATABASE_ENV_VAR};
use mcat_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_from_cli_argument() {
    env::remove_var(CONFIG_ENV_VAR);
    let file = write_config("[scan]\nbatch_size = 64\n");

    let config = CatalogConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.scan.batch_size, 64);
    assert_eq!(config.scan.page_size, 100);
}

#[test]
#[serial]
fn test_load_from_environment() {
    let file = write_config("[cache]\nmax_chunks = 3\n");
    env::set_var(CONFIG_ENV_VAR, file.path());

    let config = CatalogConfig::load(None).unwrap();

    env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(config.cache.max_chunks, 3);
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let result = CatalogConfig::load(Some(Path::new("/nonexistent/mcat/config.toml")));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
#[serial]
fn test_exclusion_overrides() {
    env::remove_var(CONFIG_ENV_VAR);
    let file = write_config(
        r#"
        [exclusion]
        substrings = ["/podcasts/"]
        patterns = []
        "#,
    );

    let config = CatalogConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.exclusion.substrings, vec!["/podcasts/"]);
    assert!(config.exclusion.patterns.is_empty());
}

#[test]
#[serial]
fn test_database_path_priority() {
    let config = CatalogConfig {
        database_path: Some(PathBuf::from("/config/catalog.db")),
        ..Default::default()
    };

    env::remove_var(DATABASE_ENV_VAR);
    assert_eq!(
        config.resolve_database_path(None),
        PathBuf::from("/config/catalog.db")
    );

    env::set_var(DATABASE_ENV_VAR, "/env/catalog.db");
    assert_eq!(
        config.resolve_database_path(None),
        PathBuf::from("/env/catalog.db")
    );
    assert_eq!(
        config.resolve_database_path(Some(Path::new("/cli/catalog.db"))),
        PathBuf::from("/cli/catalog.db")
    );
    env::remove_var(DATABASE_ENV_VAR);

    let fallback = CatalogConfig::default().resolve_database_path(None);
    assert!(fallback.ends_with("catalog.db"));
}
