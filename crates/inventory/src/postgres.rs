//! PostgreSQL-backed reservation store.
//!
//! Each mutation is a single CTE statement, so the stock check and the
//! counter updates happen under one row lock in one round trip. This is
//! the relational rendering of scripted cache mutation: no caller ever
//! observes the counters between the check and the write.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, ReservationId};
use sqlx::{PgPool, Row};

use crate::{InventoryError, ReservationStore, Result, StockSummary};

/// Key of the single shared stock counter row.
const STOCK_KEY: &str = "default";

/// Reservation store backed by the `inventory_stock` and
/// `inventory_hold` tables.
///
/// Unlike a cache, hold rows do not vanish at their deadline on their
/// own; the expiration reaper releases them, which both restores the
/// counters and removes the row.
#[derive(Clone)]
pub struct PostgresReservationStore {
    pool: PgPool,
}

impl PostgresReservationStore {
    /// Creates a new store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationStore for PostgresReservationStore {
    async fn reserve(&self, order_id: OrderId, ttl: Duration) -> Result<ReservationId> {
        let reservation_id = ReservationId::new();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(600));

        let result = sqlx::query(
            r#"
            WITH claimed AS (
                UPDATE inventory_stock
                SET available = available - 1, held = held + 1
                WHERE id = $1 AND available > 0
                RETURNING id
            )
            INSERT INTO inventory_hold (reservation_id, order_id, expires_at, created_at)
            SELECT $2, $3, $4, $5 FROM claimed
            "#,
        )
        .bind(STOCK_KEY)
        .bind(reservation_id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(InventoryError::InsufficientStock);
        }
        Ok(reservation_id)
    }

    async fn commit(&self, reservation_id: ReservationId) -> Result<()> {
        // No-op when the hold row is already gone.
        sqlx::query(
            r#"
            WITH removed AS (
                DELETE FROM inventory_hold
                WHERE reservation_id = $2
                RETURNING reservation_id
            )
            UPDATE inventory_stock
            SET held = held - 1
            WHERE id = $1 AND EXISTS (SELECT 1 FROM removed)
            "#,
        )
        .bind(STOCK_KEY)
        .bind(reservation_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release(&self, reservation_id: ReservationId) -> Result<()> {
        sqlx::query(
            r#"
            WITH removed AS (
                DELETE FROM inventory_hold
                WHERE reservation_id = $2
                RETURNING reservation_id
            )
            UPDATE inventory_stock
            SET held = held - 1, available = available + 1
            WHERE id = $1 AND EXISTS (SELECT 1 FROM removed)
            "#,
        )
        .bind(STOCK_KEY)
        .bind(reservation_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn summary(&self) -> Result<StockSummary> {
        let row = sqlx::query("SELECT available, held FROM inventory_stock WHERE id = $1")
            .bind(STOCK_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(StockSummary {
                available: row.try_get("available")?,
                held: row.try_get("held")?,
            }),
            None => Ok(StockSummary {
                available: 0,
                held: 0,
            }),
        }
    }

    async fn seed_stock(&self, units: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_stock (id, available, held)
            VALUES ($1, $2, 0)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(STOCK_KEY)
        .bind(units)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
