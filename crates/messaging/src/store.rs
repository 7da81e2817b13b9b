//! Outbox ledger persistence trait.

use async_trait::async_trait;
use common::EventId;

use crate::{OutboxEvent, Result};

/// Persistence operations for the outbox ledger.
///
/// `append` is expected to be called from within the same unit of work
/// as the business write that produced the events; the other operations
/// belong to the relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends pending rows to the ledger.
    async fn append(&self, events: &[OutboxEvent]) -> Result<()>;

    /// Reads up to `limit` pending rows, oldest first.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>>;

    /// Marks a row as acknowledged by the broker, clearing any recorded error.
    async fn mark_sent(&self, id: EventId) -> Result<()>;

    /// Records a failed publish attempt.
    ///
    /// Increments the retry count and stores the (truncated) error text.
    /// The row stays pending until the count reaches `max_retries`, at
    /// which point it flips to failed and becomes inert.
    async fn mark_failed(&self, id: EventId, error: &str, max_retries: i32) -> Result<()>;

    /// Looks up a single row by id.
    async fn find(&self, id: EventId) -> Result<Option<OutboxEvent>>;
}
