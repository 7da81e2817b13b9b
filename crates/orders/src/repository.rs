//! Order persistence trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, OrderId};
use messaging::OutboxEvent;

use crate::{Order, Result};

/// Persistence operations for order rows.
///
/// `update` is the write-ahead point of the outbox pattern: the status
/// change and its outbox rows commit or roll back as one unit.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts freshly created orders.
    async fn insert(&self, orders: &[Order]) -> Result<()>;

    /// Looks up an order by id.
    async fn find(&self, id: OrderId) -> Result<Option<Order>>;

    /// Persists a mutated order together with any outbox events, as a
    /// single unit, guarded by a compare-and-swap on `order.version`
    /// (the version the caller read). The stored version increments on
    /// success; [`OrderError::VersionConflict`] is returned when the
    /// row moved underneath the caller.
    ///
    /// When `processed` carries an event id, the id joins the same
    /// unit: it is recorded in the dedup ledger alongside the state
    /// change, and an id that is already recorded aborts the whole
    /// write with [`OrderError::DuplicateEvent`]. The record and the
    /// effect can never exist without each other.
    ///
    /// [`OrderError::VersionConflict`]: crate::OrderError::VersionConflict
    /// [`OrderError::DuplicateEvent`]: crate::OrderError::DuplicateEvent
    async fn update(
        &self,
        order: &Order,
        events: &[OutboxEvent],
        processed: Option<EventId>,
    ) -> Result<()>;

    /// Returns reserved orders whose deadline is before `now`.
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>>;
}
