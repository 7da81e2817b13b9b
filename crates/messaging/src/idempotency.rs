//! Idempotent event-consumption gate.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use common::EventId;
use tokio::sync::Mutex;

use crate::MessagingError;

/// Outcome of guarding an action behind the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyOutcome<T> {
    /// The action ran and its result is carried here.
    Applied(T),
    /// The event id was already recorded; the effect was not applied again.
    AlreadyProcessed,
}

impl<T> IdempotencyOutcome<T> {
    /// Returns true if the effect was skipped as a duplicate.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, IdempotencyOutcome::AlreadyProcessed)
    }
}

/// Dedup ledger: existence of an entry means the event's effect has
/// already been applied.
///
/// `try_record` is the ledger's write primitive. Consumers whose effect
/// is itself a database write must not call it on its own pool
/// connection; they record the id inside the same transaction as the
/// effect (see `record_processed_event`), so the record and the effect
/// commit or roll back together.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Attempts to record the event id. Returns false when the id was
    /// already present (duplicate delivery).
    async fn try_record(&self, event_id: EventId) -> Result<bool, MessagingError>;

    /// Returns true if the event id has been recorded.
    async fn is_processed(&self, event_id: EventId) -> Result<bool, MessagingError>;
}

/// Guard that applies a consumer side effect at most once per event id.
///
/// The gate's own check is a cheap fast path: ids that are already in
/// the ledger are skipped without running the action. The authoritative
/// duplicate detection belongs to the action itself — its transactional
/// write records the event id in the same unit of work as the state
/// change, and reports [`IdempotencyOutcome::AlreadyProcessed`] when
/// that record conflicts. An action that fails therefore leaves no
/// record behind, and a redelivery is treated as new and reattempted;
/// an action that succeeds commits the record and the effect together,
/// so neither can exist without the other.
pub struct IdempotencyGate<D> {
    store: D,
}

impl<D: DedupStore> IdempotencyGate<D> {
    /// Creates a gate over the given dedup ledger.
    pub fn new(store: D) -> Self {
        Self { store }
    }

    /// Runs `action` unless `event_id` has already been processed.
    pub async fn execute<T, E, F, Fut>(
        &self,
        event_id: EventId,
        action: F,
    ) -> Result<IdempotencyOutcome<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IdempotencyOutcome<T>, E>>,
        E: From<MessagingError>,
    {
        if self.store.is_processed(event_id).await? {
            metrics::counter!("duplicate_events_total").increment(1);
            tracing::debug!(%event_id, "duplicate event delivery absorbed");
            return Ok(IdempotencyOutcome::AlreadyProcessed);
        }

        let outcome = action().await?;
        if outcome.is_duplicate() {
            // Lost the race to a concurrent delivery of the same id;
            // its transaction recorded the event first.
            metrics::counter!("duplicate_events_total").increment(1);
            tracing::debug!(%event_id, "concurrent duplicate detected at the write");
        }
        Ok(outcome)
    }
}

/// In-memory dedup ledger for testing.
#[derive(Clone, Default)]
pub struct InMemoryDedupStore {
    processed: Arc<Mutex<HashSet<EventId>>>,
}

impl InMemoryDedupStore {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of recorded event ids.
    pub async fn record_count(&self) -> usize {
        self.processed.lock().await.len()
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn try_record(&self, event_id: EventId) -> Result<bool, MessagingError> {
        Ok(self.processed.lock().await.insert(event_id))
    }

    async fn is_processed(&self, event_id: EventId) -> Result<bool, MessagingError> {
        Ok(self.processed.lock().await.contains(&event_id))
    }
}
