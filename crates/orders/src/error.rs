//! Order error types.

use common::{EventId, OrderId};
use inventory::InventoryError;
use messaging::MessagingError;
use thiserror::Error;

/// Errors that can occur during order orchestration.
#[derive(Debug, Error)]
pub enum OrderError {
    /// A batch could not be fully reserved; every granted reservation
    /// was compensated and no order left the created state.
    #[error("insufficient inventory, batch rejected at order {failed_order}")]
    InsufficientInventory { failed_order: OrderId },

    /// Order not found.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// The order row moved since it was read. Expected under normal
    /// concurrency between the orchestrator and the reaper; the loser
    /// abandons its write.
    #[error("version conflict on order {0}")]
    VersionConflict(OrderId),

    /// The event id was already in the dedup ledger, so the whole
    /// write (state change, outbox rows and the record itself) was
    /// rolled back. A concurrent delivery applied the effect first.
    #[error("event already applied: {0}")]
    DuplicateEvent(EventId),

    /// A stored status column did not parse.
    #[error("invalid order status: {0}")]
    InvalidStatus(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Inventory store error.
    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Outbox or idempotency machinery error.
    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Payload serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
