use thiserror::Error;

use crate::{OutboxStatus, StagedEventId};

/// Errors that can occur when staging or relaying outbox events.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The event body could not be serialized. Aborts the enclosing transaction.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A pending event already exists for this correlation key.
    #[error("A pending event already exists for correlation key {correlation_key}")]
    DuplicatePending { correlation_key: String },

    /// The row is not PENDING, so it cannot move to `to`.
    #[error("Invalid outbox transition for event {id}: {from} -> {to}")]
    InvalidTransition {
        id: StagedEventId,
        from: OutboxStatus,
        to: OutboxStatus,
    },

    /// No row with this ID exists.
    #[error("Staged event not found: {0}")]
    NotFound(StagedEventId),

    /// A stored status value is not recognised.
    #[error("Invalid outbox status: {0}")]
    InvalidStatus(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
