//! Common error types for the catalog

use thiserror::Error;

/// SQLite primary result code for "database or disk is full"
const SQLITE_FULL: &str = "13";

/// Common result type for catalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the catalog crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Media-library permission was refused
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Device media index returned an error for a query
    #[error("Media index error: {0}")]
    MediaIndex(String),

    /// Storage capacity exhausted
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Operation stopped by a cancellation request
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error means the storage engine ran out of space.
    ///
    /// SQLite reports a full disk as `SQLITE_FULL`; that is folded into
    /// the same bucket as an explicit `QuotaExceeded`.
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            Error::QuotaExceeded(_) => true,
            Error::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some(SQLITE_FULL)
            }
            _ => false,
        }
    }
}
