//! PostgreSQL-backed outbox and dedup stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::outbox::truncate_error;
use crate::{MessagingError, OutboxEvent, OutboxStatus, OutboxStore, Result};

/// Inserts outbox rows through an existing connection or transaction.
///
/// Business repositories call this with their own transaction so the
/// ledger rows commit or roll back together with the state change that
/// produced them.
pub async fn insert_outbox_events(conn: &mut PgConnection, events: &[OutboxEvent]) -> Result<()> {
    for event in events {
        sqlx::query(
            r#"
            INSERT INTO outbox_event
                (id, aggregate_type, aggregate_id, event_type, payload,
                 status, retry_count, last_error, created_at, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.status.as_str())
        .bind(event.retry_count)
        .bind(&event.last_error)
        .bind(event.created_at)
        .bind(event.sent_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Records an event id in the dedup ledger through an existing
/// connection or transaction. Returns false when the id was already
/// present.
///
/// Consumers call this with the same transaction as the state change
/// the event produces, so the "processed" record and the effect commit
/// or roll back as one unit.
pub async fn record_processed_event(conn: &mut PgConnection, event_id: EventId) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO processed_event (event_id, processed_at)
        VALUES ($1, $2)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(event_id.as_uuid())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Outbox ledger stored in the `outbox_event` table.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Creates a new store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_event(row: PgRow) -> Result<OutboxEvent> {
        let status_str: String = row.try_get("status")?;
        let status = match OutboxStatus::parse(&status_str) {
            Some(status) => status,
            None => return Err(MessagingError::InvalidStatus(status_str)),
        };

        Ok(OutboxEvent {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            status,
            retry_count: row.try_get("retry_count")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            sent_at: row.try_get("sent_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn append(&self, events: &[OutboxEvent]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_outbox_events(&mut tx, events).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        // SKIP LOCKED keeps concurrent relay instances off the same rows
        // while the read is in progress. The lock does not outlive the
        // statement, so duplicate publishes remain possible across
        // instances; downstream dedup absorbs them.
        let rows = sqlx::query(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, payload,
                   status, retry_count, last_error, created_at, sent_at
            FROM outbox_event
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn mark_sent(&self, id: EventId) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_event
            SET status = 'SENT', sent_at = $2, last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MessagingError::EventNotFound(id));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: EventId, error: &str, max_retries: i32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_event
            SET retry_count = retry_count + 1,
                last_error = $2,
                status = CASE WHEN retry_count + 1 >= $3 THEN 'FAILED' ELSE 'PENDING' END
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(truncate_error(error))
        .bind(max_retries)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MessagingError::EventNotFound(id));
        }
        Ok(())
    }

    async fn find(&self, id: EventId) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, payload,
                   status, retry_count, last_error, created_at, sent_at
            FROM outbox_event
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_event).transpose()
    }
}

/// Dedup ledger stored in the `processed_event` table.
///
/// The unique key on `event_id` makes the duplicate check race-free:
/// two concurrent deliveries of the same event can both pass an
/// application-level check, but only one insert wins.
#[derive(Clone)]
pub struct PostgresDedupStore {
    pool: PgPool,
}

impl PostgresDedupStore {
    /// Creates a new store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl crate::DedupStore for PostgresDedupStore {
    async fn try_record(&self, event_id: EventId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        record_processed_event(&mut conn, event_id).await
    }

    async fn is_processed(&self, event_id: EventId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM processed_event WHERE event_id = $1)")
                .bind(event_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}
