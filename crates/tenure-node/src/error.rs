//! Error types for the Tenure node.

use crate::space::ClientError;
use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Registry error
    #[error("Registry error: {0}")]
    Registry(#[from] tenure_registry::Error),

    /// Invalid tier table
    #[error("Tier table error: {0}")]
    Table(#[from] tenure_tiers::TableError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Space client error
    #[error("Space client error: {0}")]
    Client(#[from] ClientError),

    /// Scheduler was asked to start while running
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// Scheduler was asked to stop while stopped
    #[error("scheduler is not running")]
    NotRunning,

    /// A reconciliation pass is already in flight
    #[error("a reconciliation pass is already in progress")]
    PassInProgress,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
