//! Error types for deferpage operations.
//!
//! Nothing in the per-request pipeline hands these to the caller: components
//! log them and fall back to leaving the resource untouched. They surface
//! only from configuration loading.

use thiserror::Error;

/// Errors that can occur while reading sources or writing cache entries.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Malformed configuration or font manifest.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not persist cache file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Source file not found: {0}")]
    MissingSource(String),

    #[error("Path is outside the site root: {0}")]
    OutsideRoot(String),
}

pub type Result<T> = std::result::Result<T, Error>;
