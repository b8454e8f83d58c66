//! Error types for the memory subsystem.

use std::time::Duration;

use thiserror::Error;

/// Memory subsystem error type.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The backing service rejected a store creation because the name is taken.
    #[error("memory store already exists: {name}")]
    AlreadyExists {
        /// Store name that conflicted.
        name: String,
    },
    /// No store with the given identifier.
    #[error("memory store not found: {0}")]
    StoreNotFound(String),
    /// The store reached a terminal failure status while provisioning.
    #[error("memory store {id} failed: {reason}")]
    StoreFailed {
        /// Store identifier.
        id: String,
        /// Reason reported by the backing service.
        reason: String,
    },
    /// The store did not become active within the bounded wait.
    #[error("memory store {id} not active after {waited:?}")]
    CreationTimeout {
        /// Store identifier.
        id: String,
        /// How long the caller waited.
        waited: Duration,
    },
    /// A conflict was reported but the conflicting store cannot be listed.
    #[error("memory store {name} reported as existing but not found on re-list")]
    Inconsistent {
        /// Store name.
        name: String,
    },
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Invalid event payload.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    /// Generic backing-service failure.
    #[error("memory service error: {0}")]
    Service(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MemoryError {
    /// Whether this error is the name-conflict signal raised on create.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Convenience result alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
