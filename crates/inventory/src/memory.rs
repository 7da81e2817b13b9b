//! In-memory reservation store for testing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{OrderId, ReservationId};

use crate::{InventoryError, ReservationStore, Result, StockSummary};

#[derive(Debug, Clone, Copy)]
struct Hold {
    order_id: OrderId,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct InMemoryState {
    available: i64,
    held: i64,
    seeded: bool,
    holds: HashMap<ReservationId, Hold>,
}

impl InMemoryState {
    /// Drops lapsed hold records without touching the counters,
    /// mirroring silent TTL expiry in a cache. The reaper is the only
    /// thing that reconciles the counters afterwards.
    fn purge_expired(&mut self, now: Instant) {
        self.holds.retain(|_, hold| hold.expires_at > now);
    }
}

/// In-memory reservation store.
///
/// All mutations run under one mutex, which gives the same atomicity
/// the production store gets from single-statement execution.
#[derive(Clone, Default)]
pub struct InMemoryReservationStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryReservationStore {
    /// Creates a new store with no stock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store seeded with `units` of available stock.
    pub fn with_stock(units: i64) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap();
            state.available = units;
            state.seeded = true;
        }
        store
    }

    /// Returns the order that owns a live hold, if any.
    pub fn hold_owner(&self, reservation_id: ReservationId) -> Option<OrderId> {
        let mut state = self.state.lock().unwrap();
        state.purge_expired(Instant::now());
        state.holds.get(&reservation_id).map(|hold| hold.order_id)
    }

    /// Number of live hold records.
    pub fn hold_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.purge_expired(Instant::now());
        state.holds.len()
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn reserve(&self, order_id: OrderId, ttl: Duration) -> Result<ReservationId> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        state.purge_expired(now);

        if state.available <= 0 {
            return Err(InventoryError::InsufficientStock);
        }

        let reservation_id = ReservationId::new();
        state.available -= 1;
        state.held += 1;
        state.holds.insert(
            reservation_id,
            Hold {
                order_id,
                expires_at: now + ttl,
            },
        );
        Ok(reservation_id)
    }

    async fn commit(&self, reservation_id: ReservationId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.purge_expired(Instant::now());
        if state.holds.remove(&reservation_id).is_some() {
            state.held -= 1;
        }
        Ok(())
    }

    async fn release(&self, reservation_id: ReservationId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.purge_expired(Instant::now());
        if state.holds.remove(&reservation_id).is_some() {
            state.held -= 1;
            state.available += 1;
        }
        Ok(())
    }

    async fn summary(&self) -> Result<StockSummary> {
        let state = self.state.lock().unwrap();
        Ok(StockSummary {
            available: state.available,
            held: state.held,
        })
    }

    async fn seed_stock(&self, units: i64) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.seeded {
            return Ok(false);
        }
        state.available = units;
        state.seeded = true;
        Ok(true)
    }
}
