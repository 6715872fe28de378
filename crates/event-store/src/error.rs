use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors returned by event store implementations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream moved since the caller read it.
    #[error(
        "Concurrency conflict for stream {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// A commit was malformed (empty, mixed streams, version gaps).
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// An envelope was built without one of its required fields.
    #[error("Invalid envelope: missing {0}")]
    InvalidEnvelope(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// True when retrying against fresh state may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
