//! Error types for the storage layer.

use thiserror::Error;
use timeline_core::{ItemId, Pid};

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Item record not found.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// Profile not found.
    #[error("profile not found: {0}")]
    ProfileNotFound(Pid),

    /// Generic key or member absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport or connection failure talking to a backend.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A stored record could not be decoded.
    #[error("malformed record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    /// Caller input rejected before touching the store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Password hashing or verification failed.
    #[error("password error: {0}")]
    Password(String),
}

impl StoreError {
    /// Wraps any error as a backend failure.
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::BackendUnavailable(err.into())
    }

    /// True for every "absent" flavour, which callers usually treat as a zero
    /// result rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ItemNotFound(_) | Self::ProfileNotFound(_) | Self::NotFound(_)
        )
    }

    /// True if the backend itself failed, as opposed to one record.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::BackendUnavailable(Box::new(err))
    }
}
