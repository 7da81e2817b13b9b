//! Inventory summary endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use inventory::ReservationStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct InventoryResponse {
    pub available: i64,
    pub held: i64,
}

/// GET /inventory — returns the available and held stock counters.
pub async fn summary<R, S, D>(
    State(state): State<Arc<AppState<R, S, D>>>,
) -> Result<Json<InventoryResponse>, ApiError>
where
    R: Send + Sync + 'static,
    S: ReservationStore + 'static,
    D: Send + Sync + 'static,
{
    let summary = state
        .reservations
        .summary()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(InventoryResponse {
        available: summary.available,
        held: summary.held,
    }))
}
