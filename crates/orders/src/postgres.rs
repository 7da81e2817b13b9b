//! PostgreSQL-backed order repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, OrderId, ReservationId, UserId};
use messaging::{OutboxEvent, insert_outbox_events, record_processed_event};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{Order, OrderError, OrderRepository, OrderStatus, Result};

/// Order repository over the `orders` table.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a new repository over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status_str: String = row.try_get("status")?;
        let status = match OrderStatus::parse(&status_str) {
            Some(status) => status,
            None => return Err(OrderError::InvalidStatus(status_str)),
        };

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            total_amount: row.try_get("total_amount")?,
            status,
            reservation_id: row
                .try_get::<Option<Uuid>, _>("reservation_id")?
                .map(ReservationId::from_uuid),
            expires_at: row.try_get("expires_at")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn insert(&self, orders: &[Order]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for order in orders {
            sqlx::query(
                r#"
                INSERT INTO orders
                    (id, user_id, total_amount, status, reservation_id,
                     expires_at, version, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(order.user_id.as_uuid())
            .bind(order.total_amount)
            .bind(order.status.as_str())
            .bind(order.reservation_id.map(|rid| rid.as_uuid()))
            .bind(order.expires_at)
            .bind(order.version)
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, total_amount, status, reservation_id,
                   expires_at, version, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn update(
        &self,
        order: &Order,
        events: &[OutboxEvent],
        processed: Option<EventId>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, reservation_id = $4, expires_at = $5,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.version)
        .bind(order.status.as_str())
        .bind(order.reservation_id.map(|rid| rid.as_uuid()))
        .bind(order.expires_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Row missing or version moved; either way the caller's
            // read is stale and the write must be abandoned.
            return Err(OrderError::VersionConflict(order.id));
        }

        // The dedup record rides the same transaction as the status
        // change and the outbox rows. Dropping `tx` on the duplicate
        // path rolls all three back together.
        if let Some(event_id) = processed {
            let recorded = record_processed_event(&mut tx, event_id)
                .await
                .map_err(OrderError::Messaging)?;
            if !recorded {
                return Err(OrderError::DuplicateEvent(event_id));
            }
        }

        insert_outbox_events(&mut tx, events)
            .await
            .map_err(OrderError::Messaging)?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, total_amount, status, reservation_id,
                   expires_at, version, created_at
            FROM orders
            WHERE status = 'RESERVED' AND expires_at < $1
            ORDER BY expires_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}
