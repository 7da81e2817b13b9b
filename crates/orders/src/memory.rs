//! In-memory order repository for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{EventId, OrderId};
use messaging::{DedupStore, InMemoryDedupStore, InMemoryOutboxStore, OutboxEvent, OutboxStore};
use tokio::sync::RwLock;

use crate::{Order, OrderError, OrderRepository, OrderStatus, Result};

/// In-memory order repository.
///
/// Shares an [`InMemoryOutboxStore`] and an [`InMemoryDedupStore`] so
/// that `update` co-writes outbox rows and the dedup record the way the
/// SQL repository does inside one transaction.
#[derive(Clone)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    outbox: InMemoryOutboxStore,
    dedup: InMemoryDedupStore,
}

impl InMemoryOrderRepository {
    /// Creates a repository co-writing into the given outbox and dedup
    /// stores.
    pub fn new(outbox: InMemoryOutboxStore, dedup: InMemoryDedupStore) -> Self {
        Self {
            orders: Arc::new(RwLock::new(HashMap::new())),
            outbox,
            dedup,
        }
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, orders: &[Order]) -> Result<()> {
        let mut map = self.orders.write().await;
        for order in orders {
            map.insert(order.id, order.clone());
        }
        Ok(())
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        order: &Order,
        events: &[OutboxEvent],
        processed: Option<EventId>,
    ) -> Result<()> {
        // The write lock is held through every fallible step so the
        // whole update behaves like the SQL repository's transaction:
        // a duplicate event id aborts before any state is touched.
        let mut map = self.orders.write().await;
        let stored = map
            .get_mut(&order.id)
            .ok_or(OrderError::NotFound(order.id))?;
        if stored.version != order.version {
            return Err(OrderError::VersionConflict(order.id));
        }

        if let Some(event_id) = processed
            && !self.dedup.try_record(event_id).await?
        {
            return Err(OrderError::DuplicateEvent(event_id));
        }

        let mut updated = order.clone();
        updated.version = order.version + 1;
        *stored = updated;
        drop(map);

        self.outbox.append(events).await?;
        Ok(())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|order| {
                order.status == OrderStatus::Reserved
                    && order.expires_at.is_some_and(|deadline| deadline < now)
            })
            .cloned()
            .collect())
    }
}
