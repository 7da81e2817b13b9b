//! Order placement and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use inventory::ReservationStore;
use messaging::DedupStore;
use orders::{Order, OrderRepository, OrderRequest, OrderService};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<R, S, D> {
    pub service: OrderService<R, S, D>,
    pub reservations: Arc<S>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrdersRequest {
    pub orders: Vec<OrderRequest>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrdersPlacedResponse {
    pub order_ids: Vec<OrderId>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub user_id: String,
    pub total_amount: i64,
    pub status: String,
    pub reservation_id: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            total_amount: order.total_amount,
            status: order.status.to_string(),
            reservation_id: order.reservation_id.map(|rid| rid.to_string()),
            expires_at: order.expires_at,
            created_at: order.created_at,
        }
    }
}

// -- Handlers --

/// POST /orders — places a batch of orders, reserving stock for each.
///
/// The batch is all-or-nothing: a reservation shortage rejects the
/// whole request with 409 and releases anything already held.
#[tracing::instrument(skip(state, req))]
pub async fn place<R, S, D>(
    State(state): State<Arc<AppState<R, S, D>>>,
    Json(req): Json<PlaceOrdersRequest>,
) -> Result<(StatusCode, Json<OrdersPlacedResponse>), ApiError>
where
    R: OrderRepository + 'static,
    S: ReservationStore + 'static,
    D: DedupStore + 'static,
{
    if req.orders.is_empty() {
        return Err(ApiError::BadRequest("order batch is empty".to_string()));
    }
    for order in &req.orders {
        if order.total_amount <= 0 {
            return Err(ApiError::BadRequest(
                "total_amount must be positive".to_string(),
            ));
        }
    }

    let order_ids = state.service.place_orders(req.orders).await?;
    Ok((StatusCode::CREATED, Json(OrdersPlacedResponse { order_ids })))
}

/// GET /orders/{id} — fetches one order.
#[tracing::instrument(skip(state))]
pub async fn get<R, S, D>(
    State(state): State<Arc<AppState<R, S, D>>>,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<OrderResponse>, ApiError>
where
    R: OrderRepository + 'static,
    S: ReservationStore + 'static,
    D: DedupStore + 'static,
{
    let order = state
        .service
        .get_order(OrderId::from_uuid(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {id} not found")))?;
    Ok(Json(OrderResponse::from(order)))
}
