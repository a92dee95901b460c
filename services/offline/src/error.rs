//! services/offline/src/error.rs
//!
//! Defines the primary error type for the offline gateway service.

use crate::config::ConfigError;
use story_offline_core::ports::PortError;

/// The primary error type for the `offline` service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Maps a storage-layer failure onto the port error taxonomy.
pub(crate) fn storage_error(e: sqlx::Error) -> PortError {
    PortError::StorageUnavailable(e.to_string())
}
