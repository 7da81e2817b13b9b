//! Messaging error types.

use common::EventId;
use thiserror::Error;

/// Errors that can occur in the outbox, relay and idempotency machinery.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker rejected or failed a publish.
    #[error("publish failed: {0}")]
    Publish(String),

    /// An outbox row id was not found.
    #[error("outbox event not found: {0}")]
    EventNotFound(EventId),

    /// A stored status column did not parse.
    #[error("invalid outbox status: {0}")]
    InvalidStatus(String),
}
