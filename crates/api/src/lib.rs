//! HTTP API server for the order system.
//!
//! Exposes order placement, lookup, the inventory summary and the
//! payment webhook, with structured logging (tracing) and Prometheus
//! metrics. The outbox relay and the expiration reaper run alongside
//! the server as background tasks.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use inventory::{InMemoryReservationStore, ReservationStore};
use messaging::{
    DedupStore, InMemoryDedupStore, InMemoryOutboxStore, InMemoryPublisher, OutboxRelay,
    RelayConfig,
};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{InMemoryOrderRepository, OrderRepository, OrderService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R, S, D>(state: Arc<AppState<R, S, D>>, metrics_handle: PrometheusHandle) -> Router
where
    R: OrderRepository + 'static,
    S: ReservationStore + 'static,
    D: DedupStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::place::<R, S, D>))
        .route("/orders/{id}", get(routes::orders::get::<R, S, D>))
        .route("/inventory", get(routes::inventory::summary::<R, S, D>))
        .route("/webhooks/payment", post(routes::webhook::payment::<R, S, D>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// In-memory application state, used by tests and local runs without a
/// database or broker.
pub type InMemoryAppState =
    AppState<InMemoryOrderRepository, InMemoryReservationStore, InMemoryDedupStore>;

/// Creates fully in-memory state plus the relay that drains its outbox.
pub fn create_default_state(
    initial_stock: i64,
    reservation_ttl: Duration,
) -> (
    Arc<InMemoryAppState>,
    Arc<OutboxRelay<InMemoryOutboxStore, InMemoryPublisher>>,
    Arc<InMemoryPublisher>,
) {
    let outbox = Arc::new(InMemoryOutboxStore::new());
    let publisher = Arc::new(InMemoryPublisher::new());
    // One dedup ledger backs both the repository's transactional write
    // and the gate's fast path.
    let dedup = InMemoryDedupStore::new();
    let repo = Arc::new(InMemoryOrderRepository::new(
        (*outbox).clone(),
        dedup.clone(),
    ));
    let reservations = Arc::new(InMemoryReservationStore::with_stock(initial_stock));

    let service = OrderService::new(
        Arc::clone(&repo),
        Arc::clone(&reservations),
        dedup,
        reservation_ttl,
    );
    let relay = Arc::new(OutboxRelay::new(
        Arc::clone(&outbox),
        Arc::clone(&publisher),
        RelayConfig::default(),
    ));

    let state = Arc::new(AppState {
        service,
        reservations,
    });
    (state, relay, publisher)
}
