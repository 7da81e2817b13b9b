//! Domain event payloads carried inside [`EventEnvelope::payload`].
//!
//! [`EventEnvelope::payload`]: crate::EventEnvelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{OrderId, ReservationId, UserId};

/// Aggregate type string for order events.
pub const AGGREGATE_ORDER: &str = "ORDER";

/// Event type emitted when a batch order has reserved its inventory.
pub const EVENT_ORDER_RESERVED: &str = "ORDER_RESERVED";
/// Event type emitted when payment succeeded and the reservation was committed.
pub const EVENT_ORDER_CONFIRMED: &str = "ORDER_CONFIRMED";
/// Event type emitted when payment failed and the reservation was released.
pub const EVENT_ORDER_CANCELED: &str = "ORDER_CANCELED";
/// Event type consumed from the payment service on success.
pub const EVENT_PAYMENT_COMPLETED: &str = "PAYMENT_COMPLETED";
/// Event type consumed from the payment service on failure.
pub const EVENT_PAYMENT_FAILED: &str = "PAYMENT_FAILED";

/// Emitted by the order service once inventory is held for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReservedPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub reservation_id: ReservationId,
    pub total_amount: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Emitted by the order service once payment completed and the hold
/// was converted into a consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmedPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_amount: i64,
    pub confirmed_at: DateTime<Utc>,
}

/// Emitted by the order service when a failed payment canceled the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCanceledPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_amount: i64,
    pub canceled_at: DateTime<Utc>,
}

/// Consumed from the payment service when a charge succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompletedPayload {
    pub payment_id: Uuid,
    pub order_id: OrderId,
    pub reservation_id: Option<ReservationId>,
    pub amount: i64,
    pub completed_at: DateTime<Utc>,
}

/// Consumed from the payment service when a charge failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailedPayload {
    pub payment_id: Uuid,
    pub order_id: OrderId,
    pub reservation_id: Option<ReservationId>,
    pub amount: i64,
    pub failed_at: DateTime<Utc>,
}
