//! Common error types for mixcrate

use thiserror::Error;

/// Common result type for mixcrate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the catalog, scheduler and API layers
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// External provider (streaming catalog, cover host) failure
    #[error("External provider error: {0}")]
    External(String),

    /// Extractor subprocess failure (non-zero exit, missing binary)
    #[error("Extractor error: {0}")]
    Extractor(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
