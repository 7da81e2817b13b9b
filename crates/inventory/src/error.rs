//! Inventory error types.

use thiserror::Error;

/// Errors that can occur in the reservation store.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// No available stock was left to reserve. Nothing was mutated.
    #[error("insufficient stock")]
    InsufficientStock,

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Hold payload serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
