//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::routes::orders::AppState;
use inventory::{PostgresReservationStore, ReservationStore};
use messaging::{OutboxRelay, PostgresDedupStore, PostgresOutboxStore, TracingPublisher};
use orders::{ExpirationReaper, OrderService, PostgresOrderRepository};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect to the database and apply migrations
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let repo = Arc::new(PostgresOrderRepository::new(pool.clone()));
    repo.run_migrations().await.expect("migrations failed");

    // 4. Bootstrap inventory on first boot
    let reservations = Arc::new(PostgresReservationStore::new(pool.clone()));
    match reservations
        .seed_stock(config.initial_stock)
        .await
        .expect("inventory bootstrap failed")
    {
        true => tracing::info!(units = config.initial_stock, "seeded initial stock"),
        false => tracing::info!("stock already seeded, skipping bootstrap"),
    }

    // 5. Start the outbox relay and the expiration reaper
    let outbox = Arc::new(PostgresOutboxStore::new(pool.clone()));
    let relay = Arc::new(OutboxRelay::new(
        Arc::clone(&outbox),
        Arc::new(TracingPublisher::new()),
        config.relay_config(),
    ));
    tokio::spawn(Arc::clone(&relay).run());

    let reaper = Arc::new(ExpirationReaper::new(
        Arc::clone(&repo),
        Arc::clone(&reservations),
        config.reaper_period(),
    ));
    tokio::spawn(Arc::clone(&reaper).run());

    // 6. Build the application
    let service = OrderService::new(
        Arc::clone(&repo),
        Arc::clone(&reservations),
        PostgresDedupStore::new(pool.clone()),
        config.reservation_ttl(),
    );
    let state = Arc::new(AppState {
        service,
        reservations,
    });
    let app = api::create_app(state, metrics_handle);

    // 7. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Let in-flight outbox publishes finish their bookkeeping.
    relay.drain().await;
    tracing::info!("server shut down gracefully");
}
