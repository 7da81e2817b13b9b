//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p orders --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{EventId, ReservationId, UserId};
use messaging::{DedupStore, OutboxEvent, OutboxStore, PostgresDedupStore, PostgresOutboxStore};
use orders::{Order, OrderError, OrderRepository, OrderStatus, PostgresOrderRepository};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!("../../../migrations/20250601000000_init.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh pool with cleared tables
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    // Create a fresh pool for each test to avoid connection issues
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query("TRUNCATE TABLE orders, outbox_event, processed_event")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn confirmed_event(order: &Order) -> OutboxEvent {
    OutboxEvent::new(
        "ORDER",
        order.id.as_uuid(),
        "ORDER_CONFIRMED",
        r#"{"test":true}"#,
    )
}

#[tokio::test]
#[serial_test::serial]
async fn insert_and_find_round_trip() {
    let pool = get_test_pool().await;
    let repo = PostgresOrderRepository::new(pool);

    let mut order = Order::new(UserId::new(), 2500);
    order.mark_reserved(ReservationId::new(), Utc::now() + chrono::Duration::seconds(600));
    repo.insert(std::slice::from_ref(&order)).await.unwrap();

    let stored = repo.find(order.id).await.unwrap().unwrap();
    assert_eq!(stored.id, order.id);
    assert_eq!(stored.user_id, order.user_id);
    assert_eq!(stored.status, OrderStatus::Reserved);
    assert_eq!(stored.reservation_id, order.reservation_id);
    assert_eq!(stored.total_amount, 2500);

    assert!(repo.find(common::OrderId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[serial_test::serial]
async fn update_bumps_the_version_and_co_commits_outbox_rows() {
    let pool = get_test_pool().await;
    let repo = PostgresOrderRepository::new(pool.clone());
    let outbox = PostgresOutboxStore::new(pool);

    let order = Order::new(UserId::new(), 2500);
    repo.insert(std::slice::from_ref(&order)).await.unwrap();

    let mut read = repo.find(order.id).await.unwrap().unwrap();
    read.status = OrderStatus::Confirmed;
    let event = confirmed_event(&read);
    repo.update(&read, std::slice::from_ref(&event), None)
        .await
        .unwrap();

    let stored = repo.find(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert_eq!(stored.version, read.version + 1);

    let row = outbox.find(event.id).await.unwrap().unwrap();
    assert_eq!(row.event_type, "ORDER_CONFIRMED");
}

#[tokio::test]
#[serial_test::serial]
async fn stale_version_loses_and_writes_nothing() {
    let pool = get_test_pool().await;
    let repo = PostgresOrderRepository::new(pool.clone());
    let outbox = PostgresOutboxStore::new(pool);

    let order = Order::new(UserId::new(), 2500);
    repo.insert(std::slice::from_ref(&order)).await.unwrap();

    // Two readers load the same version; the second write loses.
    let mut first = repo.find(order.id).await.unwrap().unwrap();
    let mut second = repo.find(order.id).await.unwrap().unwrap();

    first.status = OrderStatus::Confirmed;
    repo.update(&first, &[], None).await.unwrap();

    second.status = OrderStatus::Expired;
    let event = confirmed_event(&second);
    let result = repo
        .update(&second, std::slice::from_ref(&event), None)
        .await;
    assert!(matches!(result, Err(OrderError::VersionConflict(_))));

    // The loser's outbox row never reached the ledger.
    let stored = repo.find(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert!(outbox.find(event.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial_test::serial]
async fn duplicate_event_id_rolls_back_state_and_outbox_together() {
    let pool = get_test_pool().await;
    let repo = PostgresOrderRepository::new(pool.clone());
    let outbox = PostgresOutboxStore::new(pool.clone());
    let dedup = PostgresDedupStore::new(pool);

    let order = Order::new(UserId::new(), 2500);
    repo.insert(std::slice::from_ref(&order)).await.unwrap();

    // A concurrent delivery already committed this event id.
    let event_id = EventId::new();
    assert!(dedup.try_record(event_id).await.unwrap());

    let mut read = repo.find(order.id).await.unwrap().unwrap();
    read.status = OrderStatus::Confirmed;
    let event = confirmed_event(&read);
    let result = repo
        .update(&read, std::slice::from_ref(&event), Some(event_id))
        .await;
    assert!(matches!(result, Err(OrderError::DuplicateEvent(_))));

    // The unique-key conflict rolled back the whole unit.
    let stored = repo.find(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Created);
    assert_eq!(stored.version, 0);
    assert!(outbox.find(event.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial_test::serial]
async fn update_commits_the_dedup_record_with_the_effect() {
    let pool = get_test_pool().await;
    let repo = PostgresOrderRepository::new(pool.clone());
    let dedup = PostgresDedupStore::new(pool);

    let order = Order::new(UserId::new(), 2500);
    repo.insert(std::slice::from_ref(&order)).await.unwrap();

    let event_id = EventId::new();
    let mut read = repo.find(order.id).await.unwrap().unwrap();
    read.status = OrderStatus::Confirmed;
    repo.update(&read, &[], Some(event_id)).await.unwrap();

    // Effect and record landed together; a second pass conflicts.
    assert!(dedup.is_processed(event_id).await.unwrap());
    let stored = repo.find(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Confirmed);

    let again = repo.update(&stored, &[], Some(event_id)).await;
    assert!(matches!(again, Err(OrderError::DuplicateEvent(_))));
}

#[tokio::test]
#[serial_test::serial]
async fn find_expired_only_returns_lapsed_reserved_orders() {
    let pool = get_test_pool().await;
    let repo = PostgresOrderRepository::new(pool);
    let now = Utc::now();

    let mut lapsed = Order::new(UserId::new(), 1000);
    lapsed.mark_reserved(ReservationId::new(), now - chrono::Duration::seconds(5));

    let mut live = Order::new(UserId::new(), 1000);
    live.mark_reserved(ReservationId::new(), now + chrono::Duration::seconds(600));

    let created = Order::new(UserId::new(), 1000);

    repo.insert(&[lapsed.clone(), live, created]).await.unwrap();

    let expired = repo.find_expired(now).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, lapsed.id);
}
