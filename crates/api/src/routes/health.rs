//! Health check endpoint.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    /// Background tasks this process runs next to the HTTP server.
    pub workers: [&'static str; 2],
}

/// GET /health — reports liveness and which background workers ship
/// with this process.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        workers: ["outbox-relay", "expiration-reaper"],
    })
}
