//! Payment provider webhook endpoint.
//!
//! Stands in for a broker subscription: the provider posts payment
//! outcomes here and the handler wraps each one in a payment-events
//! envelope before handing it to the order saga. Providers retry
//! deliveries, so the delivery id (when the provider sends one) doubles
//! as the idempotency key downstream.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use common::{
    EVENT_PAYMENT_COMPLETED, EVENT_PAYMENT_FAILED, EventEnvelope, EventId, OrderId,
    PaymentCompletedPayload, PaymentFailedPayload, ReservationId,
};
use inventory::ReservationStore;
use messaging::DedupStore;
use orders::OrderRepository;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct PaymentWebhookRequest {
    pub order_id: Uuid,
    pub success: bool,
    /// Provider delivery id; reused as the dedup key when present.
    pub event_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,
    pub reservation_id: Option<Uuid>,
    pub amount: Option<i64>,
}

#[derive(Serialize)]
pub struct WebhookAcceptedResponse {
    pub status: &'static str,
}

/// POST /webhooks/payment — applies a payment outcome to its order.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id, success = req.success))]
pub async fn payment<R, S, D>(
    State(state): State<Arc<AppState<R, S, D>>>,
    Json(req): Json<PaymentWebhookRequest>,
) -> Result<(StatusCode, Json<WebhookAcceptedResponse>), ApiError>
where
    R: OrderRepository + 'static,
    S: ReservationStore + 'static,
    D: DedupStore + 'static,
{
    let order_id = OrderId::from_uuid(req.order_id);
    let payment_id = req.payment_id.unwrap_or_else(Uuid::new_v4);
    let reservation_id = req.reservation_id.map(ReservationId::from_uuid);
    let amount = req.amount.unwrap_or(0);
    let now = Utc::now();

    let (event_type, payload) = if req.success {
        (
            EVENT_PAYMENT_COMPLETED,
            serde_json::to_string(&PaymentCompletedPayload {
                payment_id,
                order_id,
                reservation_id,
                amount,
                completed_at: now,
            }),
        )
    } else {
        (
            EVENT_PAYMENT_FAILED,
            serde_json::to_string(&PaymentFailedPayload {
                payment_id,
                order_id,
                reservation_id,
                amount,
                failed_at: now,
            }),
        )
    };
    let payload = payload.map_err(|e| ApiError::Internal(e.to_string()))?;

    let envelope = EventEnvelope {
        event_id: req.event_id.map(EventId::from_uuid).unwrap_or_default(),
        aggregate_type: "PAYMENT".to_string(),
        aggregate_id: req.order_id,
        event_type: event_type.to_string(),
        occurred_at: now,
        payload,
    };

    state.service.handle_payment_event(&envelope).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAcceptedResponse { status: "accepted" }),
    ))
}
