//! Reservation store trait.

use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, ReservationId};

use crate::Result;

/// Read-only snapshot of the stock counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockSummary {
    /// Units available for new reservations.
    pub available: i64,
    /// Units currently held by unconfirmed reservations.
    pub held: i64,
}

/// Atomic hold/commit/release operations over a shared stock counter.
///
/// Holds expire passively after their TTL: the hold record disappears
/// but the counters are not corrected by the store itself. The order
/// expiration reaper is the compensating mechanism for holds that
/// lapsed without the application being told.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Atomically claims one unit of stock for `order_id`.
    ///
    /// On success the available count drops by one, the held count rises
    /// by one, and a TTL-bearing hold record is written under a fresh
    /// reservation id. Returns [`InventoryError::InsufficientStock`]
    /// without mutating anything when no stock is available.
    ///
    /// [`InventoryError::InsufficientStock`]: crate::InventoryError::InsufficientStock
    async fn reserve(&self, order_id: OrderId, ttl: Duration) -> Result<ReservationId>;

    /// Consumes a hold permanently: the hold record is removed and the
    /// held count drops, while available stock stays decremented.
    ///
    /// A no-op when the hold record is already gone — commit can
    /// legitimately race an expiry-driven release.
    async fn commit(&self, reservation_id: ReservationId) -> Result<()>;

    /// Reverts a hold: the hold record is removed, the held count drops
    /// and the unit returns to availability. Idempotent like `commit`.
    async fn release(&self, reservation_id: ReservationId) -> Result<()>;

    /// Reads the current counters. Diagnostic only, not load-bearing.
    async fn summary(&self) -> Result<StockSummary>;

    /// Seeds the stock counter if it has not been initialized yet.
    /// Returns true if this call performed the seeding.
    async fn seed_stock(&self, units: i64) -> Result<bool>;
}
