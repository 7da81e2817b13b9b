//! In-memory outbox store for testing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::EventId;
use tokio::sync::RwLock;

use crate::outbox::truncate_error;
use crate::{MessagingError, OutboxEvent, OutboxStatus, OutboxStore, Result};

/// In-memory outbox store.
///
/// Rows are kept in insertion order, which doubles as creation order,
/// so `fetch_pending` returns oldest rows first like the SQL store.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    rows: Arc<RwLock<Vec<OutboxEvent>>>,
}

impl InMemoryOutboxStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of rows in the ledger.
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns all rows currently in the given status.
    pub async fn rows_with_status(&self, status: OutboxStatus) -> Vec<OutboxEvent> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|row| row.status == status)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn append(&self, events: &[OutboxEvent]) -> Result<()> {
        self.rows.write().await.extend_from_slice(events);
        Ok(())
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| row.status == OutboxStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: EventId) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(MessagingError::EventNotFound(id))?;
        row.status = OutboxStatus::Sent;
        row.sent_at = Some(Utc::now());
        row.last_error = None;
        Ok(())
    }

    async fn mark_failed(&self, id: EventId, error: &str, max_retries: i32) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(MessagingError::EventNotFound(id))?;
        row.retry_count += 1;
        row.last_error = Some(truncate_error(error));
        if row.retry_count >= max_retries {
            row.status = OutboxStatus::Failed;
        }
        Ok(())
    }

    async fn find(&self, id: EventId) -> Result<Option<OutboxEvent>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }
}
