//! # mcat Common Library
//!
//! Shared code for the music catalog workspace:
//! - Error type and `Result` alias
//! - Configuration loading (TOML file, environment, compiled defaults)
//! - Database initialization and catalog row models
//! - Catalog event bus
//! - Millisecond time helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{CatalogEvent, EventBus};
