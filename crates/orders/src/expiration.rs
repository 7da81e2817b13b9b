//! Reservation expiration reaper.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{
    AGGREGATE_ORDER, EVENT_ORDER_CANCELED, OrderCanceledPayload,
};
use inventory::ReservationStore;
use messaging::OutboxEvent;
use tokio::time::MissedTickBehavior;

use crate::{Order, OrderError, OrderRepository, OrderStatus, Result};

/// Counts from one reaper sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Orders moved to the expired state.
    pub expired: usize,
    /// Orders skipped because another writer won the version race.
    pub conflicts: usize,
    /// Orders that hit a real error and will be retried next sweep.
    pub failures: usize,
}

/// Periodic sweep over reserved orders whose deadline has lapsed.
///
/// For each candidate the reaper releases the inventory hold, then
/// moves the order to expired with a compare-and-swap write. The
/// release comes first so stock is never stranded: if the write then
/// loses the version race, a payment outcome landed concurrently and
/// owns the order's fate. Release is idempotent, so the double-release
/// in that window is harmless for a hold the payment path already
/// removed.
pub struct ExpirationReaper<R, S> {
    repo: Arc<R>,
    reservations: Arc<S>,
    period: Duration,
}

impl<R, S> ExpirationReaper<R, S>
where
    R: OrderRepository,
    S: ReservationStore,
{
    /// Creates a reaper sweeping every `period`.
    pub fn new(repo: Arc<R>, reservations: Arc<S>, period: Duration) -> Self {
        Self {
            repo,
            reservations,
            period,
        }
    }

    /// Runs the sweep loop forever. Intended for `tokio::spawn`.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period_ms = self.period.as_millis() as u64, "expiration reaper started");

        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(stats) if stats.expired > 0 || stats.failures > 0 => {
                    tracing::info!(
                        expired = stats.expired,
                        conflicts = stats.conflicts,
                        failures = stats.failures,
                        "reaper sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "reaper sweep failed");
                }
            }
        }
    }

    /// Performs one sweep and returns what happened.
    ///
    /// Errors on individual orders are counted and logged, never fatal
    /// to the sweep; the order stays reserved and is picked up again
    /// next period.
    pub async fn sweep_once(&self) -> Result<SweepStats> {
        let candidates = self.repo.find_expired(Utc::now()).await?;
        let mut stats = SweepStats::default();

        for candidate in candidates {
            match self.expire_order(&candidate).await {
                Ok(true) => stats.expired += 1,
                Ok(false) => stats.conflicts += 1,
                Err(e) => {
                    stats.failures += 1;
                    tracing::error!(order_id = %candidate.id, error = %e, "failed to expire order");
                }
            }
        }

        if stats.expired > 0 {
            metrics::counter!("orders_expired_total").increment(stats.expired as u64);
        }
        Ok(stats)
    }

    /// Expires one order. Returns false when a concurrent writer won.
    async fn expire_order(&self, candidate: &Order) -> Result<bool> {
        // Reload: the candidate list may be stale by the time we get here.
        let Some(order) = self.repo.find(candidate.id).await? else {
            return Ok(false);
        };
        if order.status != OrderStatus::Reserved {
            return Ok(false);
        }

        if let Some(reservation_id) = order.reservation_id {
            self.reservations.release(reservation_id).await?;
        }

        let mut order = order;
        order.status = OrderStatus::Expired;

        let canceled = OrderCanceledPayload {
            order_id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount,
            canceled_at: Utc::now(),
        };
        let event = OutboxEvent::new(
            AGGREGATE_ORDER,
            order.id.as_uuid(),
            EVENT_ORDER_CANCELED,
            serde_json::to_string(&canceled)?,
        );

        match self
            .repo
            .update(&order, std::slice::from_ref(&event), None)
            .await
        {
            Ok(()) => {
                tracing::info!(order_id = %order.id, "order expired, hold released");
                Ok(true)
            }
            // A payment outcome landed between our read and write; it
            // owns the order now.
            Err(OrderError::VersionConflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
