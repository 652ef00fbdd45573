//! Error types for the registry.

use thiserror::Error;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in registry operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Store contents could not be decoded
    #[error("Corrupt store: {0}")]
    Corrupt(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
