//! Order saga orchestrator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{
    AGGREGATE_ORDER, EVENT_ORDER_CANCELED, EVENT_ORDER_CONFIRMED, EVENT_ORDER_RESERVED,
    EVENT_PAYMENT_COMPLETED, EVENT_PAYMENT_FAILED, EventEnvelope, OrderCanceledPayload,
    OrderConfirmedPayload, OrderId, OrderReservedPayload, PaymentCompletedPayload,
    PaymentFailedPayload, ReservationId,
};
use inventory::{InventoryError, ReservationStore};
use messaging::{DedupStore, IdempotencyGate, IdempotencyOutcome, OutboxEvent};

use crate::{Order, OrderError, OrderRepository, OrderRequest, OrderStatus, Result};

/// Drives the order lifecycle.
///
/// Placement reserves inventory for a whole batch with all-or-nothing
/// compensation and records one "reserved" outbox event per order in
/// the same unit as the status transition. Payment outcomes arriving
/// from the broker pass through the idempotency gate before they
/// confirm or cancel the reservation.
pub struct OrderService<R, S, D> {
    repo: Arc<R>,
    reservations: Arc<S>,
    gate: IdempotencyGate<D>,
    reservation_ttl: Duration,
}

impl<R, S, D> OrderService<R, S, D>
where
    R: OrderRepository,
    S: ReservationStore,
    D: DedupStore,
{
    /// Creates a new orchestrator.
    pub fn new(repo: Arc<R>, reservations: Arc<S>, dedup: D, reservation_ttl: Duration) -> Self {
        Self {
            repo,
            reservations,
            gate: IdempotencyGate::new(dedup),
            reservation_ttl,
        }
    }

    /// Places a batch of orders, reserving one unit of stock per order.
    ///
    /// The batch is all-or-nothing: on the first reservation shortage,
    /// every reservation already granted to the batch is released
    /// (best-effort, logged) and the whole call fails with
    /// [`OrderError::InsufficientInventory`]. No order leaves the
    /// created state in that case. On success every order transitions
    /// to reserved with its reservation id and deadline, and a
    /// "reserved" outbox event co-commits with each transition.
    #[tracing::instrument(skip(self, requests), fields(batch_size = requests.len()))]
    pub async fn place_orders(&self, requests: Vec<OrderRequest>) -> Result<Vec<OrderId>> {
        metrics::counter!("orders_placed_total").increment(requests.len() as u64);

        let orders: Vec<Order> = requests.iter().map(Order::from).collect();
        self.repo.insert(&orders).await?;

        let mut granted: Vec<ReservationId> = Vec::with_capacity(orders.len());
        for order in &orders {
            match self.reservations.reserve(order.id, self.reservation_ttl).await {
                Ok(reservation_id) => granted.push(reservation_id),
                Err(e) => {
                    tracing::warn!(
                        order_id = %order.id,
                        error = %e,
                        "reservation failed, unwinding batch"
                    );
                    self.release_granted(&granted).await;
                    metrics::counter!("order_batches_rejected_total").increment(1);
                    return match e {
                        InventoryError::InsufficientStock => {
                            Err(OrderError::InsufficientInventory {
                                failed_order: order.id,
                            })
                        }
                        other => Err(other.into()),
                    };
                }
            }
        }

        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.reservation_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(600));

        for (order, reservation_id) in orders.iter().zip(&granted) {
            let mut order = order.clone();
            order.mark_reserved(*reservation_id, expires_at);

            let payload = OrderReservedPayload {
                order_id: order.id,
                user_id: order.user_id,
                reservation_id: *reservation_id,
                total_amount: order.total_amount,
                expires_at,
                created_at: order.created_at,
            };
            let event = OutboxEvent::new(
                AGGREGATE_ORDER,
                order.id.as_uuid(),
                EVENT_ORDER_RESERVED,
                serde_json::to_string(&payload)?,
            );

            self.repo
                .update(&order, std::slice::from_ref(&event), None)
                .await?;
        }

        tracing::info!(count = orders.len(), "order batch reserved");
        Ok(orders.iter().map(|order| order.id).collect())
    }

    /// Routes a payment-events envelope to the matching handler.
    /// Unknown event types are ignored.
    pub async fn handle_payment_event(&self, envelope: &EventEnvelope) -> Result<()> {
        match envelope.event_type.as_str() {
            EVENT_PAYMENT_COMPLETED => self.handle_payment_completed(envelope).await,
            EVENT_PAYMENT_FAILED => self.handle_payment_failed(envelope).await,
            other => {
                tracing::debug!(event_type = other, "ignoring unrecognized payment event");
                Ok(())
            }
        }
    }

    /// Applies a successful payment: commits the reservation, moves the
    /// order to confirmed and emits a "confirmed" outbox event.
    /// Duplicate or stale deliveries are absorbed without error.
    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id))]
    pub async fn handle_payment_completed(&self, envelope: &EventEnvelope) -> Result<()> {
        self.gate
            .execute(envelope.event_id, || self.confirm_order(envelope))
            .await?;
        Ok(())
    }

    /// Applies a failed payment: releases the reservation, moves the
    /// order to canceled and emits a "canceled" outbox event.
    #[tracing::instrument(skip(self, envelope), fields(event_id = %envelope.event_id))]
    pub async fn handle_payment_failed(&self, envelope: &EventEnvelope) -> Result<()> {
        self.gate
            .execute(envelope.event_id, || self.cancel_order(envelope))
            .await?;
        Ok(())
    }

    /// Looks up an order by id.
    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        self.repo.find(id).await
    }

    /// Confirms the order, recording `envelope.event_id` in the same
    /// unit of work as the status change. Stale states are no-ops that
    /// record nothing; redeliveries repeat them harmlessly.
    async fn confirm_order(&self, envelope: &EventEnvelope) -> Result<IdempotencyOutcome<()>> {
        let payload: PaymentCompletedPayload = envelope.payload_as()?;
        let order = self
            .repo
            .find(payload.order_id)
            .await?
            .ok_or(OrderError::NotFound(payload.order_id))?;

        if order.status == OrderStatus::Confirmed {
            tracing::debug!(order_id = %order.id, "order already confirmed");
            return Ok(IdempotencyOutcome::Applied(()));
        }
        if order.status != OrderStatus::Reserved {
            // The state can never become valid again; erroring here
            // would retry forever.
            tracing::warn!(
                order_id = %order.id,
                status = %order.status,
                "payment completed for order not in reserved state"
            );
            return Ok(IdempotencyOutcome::Applied(()));
        }

        let Some(reservation_id) = order.reservation_id else {
            tracing::warn!(order_id = %order.id, "reserved order missing reservation id");
            return Ok(IdempotencyOutcome::Applied(()));
        };
        self.reservations.commit(reservation_id).await?;

        let mut order = order;
        order.status = OrderStatus::Confirmed;

        let confirmed = OrderConfirmedPayload {
            order_id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount,
            confirmed_at: Utc::now(),
        };
        let event = OutboxEvent::new(
            AGGREGATE_ORDER,
            order.id.as_uuid(),
            EVENT_ORDER_CONFIRMED,
            serde_json::to_string(&confirmed)?,
        );
        match self
            .repo
            .update(&order, std::slice::from_ref(&event), Some(envelope.event_id))
            .await
        {
            Ok(()) => {}
            Err(OrderError::DuplicateEvent(_)) => {
                return Ok(IdempotencyOutcome::AlreadyProcessed);
            }
            Err(e) => return Err(e),
        }

        metrics::counter!("orders_confirmed_total").increment(1);
        tracing::info!(order_id = %order.id, %reservation_id, "order confirmed");
        Ok(IdempotencyOutcome::Applied(()))
    }

    async fn cancel_order(&self, envelope: &EventEnvelope) -> Result<IdempotencyOutcome<()>> {
        let payload: PaymentFailedPayload = envelope.payload_as()?;
        let order = self
            .repo
            .find(payload.order_id)
            .await?
            .ok_or(OrderError::NotFound(payload.order_id))?;

        if order.status != OrderStatus::Reserved {
            tracing::warn!(
                order_id = %order.id,
                status = %order.status,
                "payment failed for order not in reserved state"
            );
            return Ok(IdempotencyOutcome::Applied(()));
        }

        match order.reservation_id {
            Some(reservation_id) => {
                self.reservations.release(reservation_id).await?;
                tracing::info!(order_id = %order.id, %reservation_id, "reservation released");
            }
            None => {
                tracing::warn!(order_id = %order.id, "reserved order missing reservation id");
            }
        }

        let mut order = order;
        order.status = OrderStatus::Canceled;

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
            .update(&order, std::slice::from_ref(&event), Some(envelope.event_id))
            .await
        {
            Ok(()) => {}
            Err(OrderError::DuplicateEvent(_)) => {
                return Ok(IdempotencyOutcome::AlreadyProcessed);
            }
            Err(e) => return Err(e),
        }

        metrics::counter!("orders_canceled_total").increment(1);
        tracing::info!(order_id = %order.id, "order canceled");
        Ok(IdempotencyOutcome::Applied(()))
    }

    /// Best-effort unwind of a partially reserved batch. Release is
    /// idempotent, so a failure here leaves at worst a hold for the
    /// reaper to collect after its TTL.
    async fn release_granted(&self, granted: &[ReservationId]) {
        for reservation_id in granted {
            if let Err(e) = self.reservations.release(*reservation_id).await {
                tracing::error!(%reservation_id, error = %e, "compensating release failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryOrderRepository;
    use common::{EventId, UserId};
    use inventory::InMemoryReservationStore;
    use messaging::{InMemoryDedupStore, InMemoryOutboxStore, OutboxStatus};
    use uuid::Uuid;

    const TTL: Duration = Duration::from_secs(600);

    struct Harness {
        service: OrderService<InMemoryOrderRepository, InMemoryReservationStore, InMemoryDedupStore>,
        repo: Arc<InMemoryOrderRepository>,
        reservations: Arc<InMemoryReservationStore>,
        outbox: InMemoryOutboxStore,
        dedup: InMemoryDedupStore,
    }

    fn setup(stock: i64) -> Harness {
        let outbox = InMemoryOutboxStore::new();
        let dedup = InMemoryDedupStore::new();
        // The repository and the gate share one dedup ledger, the way
        // the SQL stack shares the processed_event table.
        let repo = Arc::new(InMemoryOrderRepository::new(outbox.clone(), dedup.clone()));
        let reservations = Arc::new(InMemoryReservationStore::with_stock(stock));
        let service = OrderService::new(
            Arc::clone(&repo),
            Arc::clone(&reservations),
            dedup.clone(),
            TTL,
        );
        Harness {
            service,
            repo,
            reservations,
            outbox,
            dedup,
        }
    }

    fn requests(count: usize) -> Vec<OrderRequest> {
        (0..count)
            .map(|i| OrderRequest {
                user_id: UserId::new(),
                total_amount: 1000 * (i as i64 + 1),
            })
            .collect()
    }

    fn payment_envelope(event_type: &str, order: &Order) -> EventEnvelope {
        let order_id = order.id;
        let reservation_id = order.reservation_id;
        let payload = if event_type == EVENT_PAYMENT_COMPLETED {
            serde_json::to_string(&PaymentCompletedPayload {
                payment_id: Uuid::new_v4(),
                order_id,
                reservation_id,
                amount: order.total_amount,
                completed_at: Utc::now(),
            })
            .unwrap()
        } else {
            serde_json::to_string(&PaymentFailedPayload {
                payment_id: Uuid::new_v4(),
                order_id,
                reservation_id,
                amount: order.total_amount,
                failed_at: Utc::now(),
            })
            .unwrap()
        };
        EventEnvelope {
            event_id: EventId::new(),
            aggregate_type: "PAYMENT".to_string(),
            aggregate_id: order_id.as_uuid(),
            event_type: event_type.to_string(),
            occurred_at: Utc::now(),
            payload,
        }
    }

    #[tokio::test]
    async fn batch_placement_reserves_every_order() {
        let h = setup(10);
        let ids = h.service.place_orders(requests(3)).await.unwrap();
        assert_eq!(ids.len(), 3);

        for id in &ids {
            let order = h.repo.find(*id).await.unwrap().unwrap();
            assert_eq!(order.status, OrderStatus::Reserved);
            assert!(order.reservation_id.is_some());
            assert!(order.expires_at.is_some());
        }

        let summary = h.reservations.summary().await.unwrap();
        assert_eq!(summary.available, 7);
        assert_eq!(summary.held, 3);

        let pending = h.outbox.rows_with_status(OutboxStatus::Pending).await;
        assert_eq!(pending.len(), 3);
        assert!(pending.iter().all(|row| row.event_type == EVENT_ORDER_RESERVED));
    }

    #[tokio::test]
    async fn batch_shortage_compensates_everything() {
        let h = setup(2);
        let result = h.service.place_orders(requests(3)).await;
        assert!(matches!(
            result,
            Err(OrderError::InsufficientInventory { .. })
        ));

        // Granted reservations were released; counters fully restored.
        let summary = h.reservations.summary().await.unwrap();
        assert_eq!(summary.available, 2);
        assert_eq!(summary.held, 0);

        // No order advanced past created, no event was recorded.
        assert_eq!(h.repo.order_count().await, 3);
        assert_eq!(h.outbox.row_count().await, 0);
    }

    #[tokio::test]
    async fn last_unit_contention_gets_exactly_one_winner() {
        let h = setup(1);

        let first = h.service.place_orders(requests(1)).await;
        let second = h.service.place_orders(requests(1)).await;

        assert!(first.is_ok());
        assert!(matches!(
            second,
            Err(OrderError::InsufficientInventory { .. })
        ));

        let summary = h.reservations.summary().await.unwrap();
        assert_eq!(summary.available, 0);
        assert_eq!(summary.held, 1);
    }

    #[tokio::test]
    async fn payment_completed_confirms_and_consumes_the_hold() {
        let h = setup(1);
        let ids = h.service.place_orders(requests(1)).await.unwrap();
        let order = h.repo.find(ids[0]).await.unwrap().unwrap();

        let envelope = payment_envelope(EVENT_PAYMENT_COMPLETED, &order);
        h.service.handle_payment_event(&envelope).await.unwrap();

        let order = h.repo.find(ids[0]).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);

        // Hold consumed: stock stays decremented, held drops.
        let summary = h.reservations.summary().await.unwrap();
        assert_eq!(summary.available, 0);
        assert_eq!(summary.held, 0);

        let pending = h.outbox.rows_with_status(OutboxStatus::Pending).await;
        assert!(pending.iter().any(|row| row.event_type == EVENT_ORDER_CONFIRMED));
    }

    #[tokio::test]
    async fn duplicate_payment_completed_applies_once() {
        let h = setup(1);
        let ids = h.service.place_orders(requests(1)).await.unwrap();
        let order = h.repo.find(ids[0]).await.unwrap().unwrap();

        let envelope = payment_envelope(EVENT_PAYMENT_COMPLETED, &order);
        h.service.handle_payment_event(&envelope).await.unwrap();
        h.service.handle_payment_event(&envelope).await.unwrap();

        let order = h.repo.find(ids[0]).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);

        let confirmed: Vec<_> = h
            .outbox
            .rows_with_status(OutboxStatus::Pending)
            .await
            .into_iter()
            .filter(|row| row.event_type == EVENT_ORDER_CONFIRMED)
            .collect();
        assert_eq!(confirmed.len(), 1);
    }

    #[tokio::test]
    async fn payment_failed_cancels_and_restores_stock() {
        let h = setup(1);
        let ids = h.service.place_orders(requests(1)).await.unwrap();
        let order = h.repo.find(ids[0]).await.unwrap().unwrap();

        let envelope = payment_envelope(EVENT_PAYMENT_FAILED, &order);
        h.service.handle_payment_event(&envelope).await.unwrap();

        let order = h.repo.find(ids[0]).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);

        let summary = h.reservations.summary().await.unwrap();
        assert_eq!(summary.available, 1);
        assert_eq!(summary.held, 0);

        let pending = h.outbox.rows_with_status(OutboxStatus::Pending).await;
        assert!(pending.iter().any(|row| row.event_type == EVENT_ORDER_CANCELED));
    }

    #[tokio::test]
    async fn stale_payment_event_is_a_noop_not_an_error() {
        let h = setup(1);
        let ids = h.service.place_orders(requests(1)).await.unwrap();
        let order = h.repo.find(ids[0]).await.unwrap().unwrap();

        // Cancel first, then a late completion arrives out of order.
        let failed = payment_envelope(EVENT_PAYMENT_FAILED, &order);
        h.service.handle_payment_event(&failed).await.unwrap();

        let completed = payment_envelope(EVENT_PAYMENT_COMPLETED, &order);
        h.service.handle_payment_event(&completed).await.unwrap();

        let order = h.repo.find(ids[0]).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn unknown_payment_event_type_is_ignored() {
        let h = setup(1);
        let envelope = EventEnvelope {
            event_id: EventId::new(),
            aggregate_type: "PAYMENT".to_string(),
            aggregate_id: Uuid::new_v4(),
            event_type: "PAYMENT_REFUNDED".to_string(),
            occurred_at: Utc::now(),
            payload: "{}".to_string(),
        };
        h.service.handle_payment_event(&envelope).await.unwrap();
        assert_eq!(h.dedup.record_count().await, 0);
    }

    #[tokio::test]
    async fn missing_order_fails_loudly_and_allows_redelivery() {
        let h = setup(1);
        let mut ghost = Order::new(UserId::new(), 500);
        ghost.mark_reserved(ReservationId::new(), Utc::now());
        let envelope = payment_envelope(EVENT_PAYMENT_COMPLETED, &ghost);

        let result = h.service.handle_payment_event(&envelope).await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));

        // The failed handler committed no dedup record, so a retry is
        // treated as new.
        assert!(!h.dedup.is_processed(envelope.event_id).await.unwrap());
    }

    #[tokio::test]
    async fn failed_handler_leaves_redelivery_able_to_apply() {
        // A delivery that errors must not poison its event id: once the
        // underlying fault clears, redelivering the very same envelope
        // has to apply the effect.
        let h = setup(1);
        let mut order = Order::new(UserId::new(), 500);
        order.mark_reserved(ReservationId::new(), Utc::now() + chrono::Duration::seconds(600));
        let envelope = payment_envelope(EVENT_PAYMENT_COMPLETED, &order);

        // First delivery arrives before the order row exists and fails.
        let result = h.service.handle_payment_event(&envelope).await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
        assert!(!h.dedup.is_processed(envelope.event_id).await.unwrap());

        // The fault clears; redelivery confirms the order.
        h.repo.insert(std::slice::from_ref(&order)).await.unwrap();
        h.service.handle_payment_event(&envelope).await.unwrap();

        let stored = h.repo.find(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);
        assert!(h.dedup.is_processed(envelope.event_id).await.unwrap());
    }

    #[tokio::test]
    async fn missing_reservation_id_is_logged_not_fatal() {
        let h = setup(1);

        // Data-integrity anomaly: reserved order without a reservation id.
        let mut broken = Order::new(UserId::new(), 500);
        broken.status = OrderStatus::Reserved;
        h.repo.insert(std::slice::from_ref(&broken)).await.unwrap();

        let completed = payment_envelope(EVENT_PAYMENT_COMPLETED, &broken);
        h.service.handle_payment_event(&completed).await.unwrap();
        let order = h.repo.find(broken.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Reserved);

        // A failed payment still cancels, skipping only the release.
        let failed = payment_envelope(EVENT_PAYMENT_FAILED, &broken);
        h.service.handle_payment_event(&failed).await.unwrap();
        let order = h.repo.find(broken.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
    }
}
