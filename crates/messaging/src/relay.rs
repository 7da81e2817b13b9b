//! Background relay that drains the outbox ledger to the broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::EventEnvelope;
use tokio::time::MissedTickBehavior;

use crate::{EventPublisher, OutboxStore, Result};

/// Tuning knobs for the outbox relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Broker topic every row is published to.
    pub topic: String,
    /// Maximum pending rows read per pass.
    pub batch_size: usize,
    /// Delay between relay passes.
    pub poll_period: Duration,
    /// Ceiling on dispatched-but-unacknowledged publishes.
    pub max_in_flight: usize,
    /// Failed publish attempts tolerated before a row is parked as failed.
    pub max_retries: i32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            topic: "order-events".to_string(),
            batch_size: 50,
            poll_period: Duration::from_millis(200),
            max_in_flight: 200,
            max_retries: 10,
        }
    }
}

/// Periodically reads pending outbox rows and publishes them.
///
/// Each pass reads up to `batch_size` rows oldest-first and dispatches
/// them keyed by aggregate id. The pass itself does not wait for broker
/// acknowledgments; a spawned task performs the sent/failed bookkeeping
/// when each ack arrives, and the `max_in_flight` ceiling bounds how
/// many acks may be outstanding at once. A publish that errors may still
/// have been delivered, so downstream consumers must dedup by event id.
pub struct OutboxRelay<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    config: RelayConfig,
    in_flight: Arc<AtomicUsize>,
}

impl<S, P> OutboxRelay<S, P>
where
    S: OutboxStore + 'static,
    P: EventPublisher + 'static,
{
    /// Creates a new relay over the given store and publisher.
    pub fn new(store: Arc<S>, publisher: Arc<P>, config: RelayConfig) -> Self {
        Self {
            store,
            publisher,
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Runs the relay until the task is dropped.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                tracing::error!(error = %e, "outbox relay pass failed");
            }
        }
    }

    /// Executes a single relay pass and returns how many rows were dispatched.
    pub async fn run_once(&self) -> Result<usize> {
        if self.in_flight.load(Ordering::Acquire) >= self.config.max_in_flight {
            tracing::debug!("in-flight ceiling reached, skipping relay pass");
            return Ok(0);
        }

        let batch = self.store.fetch_pending(self.config.batch_size).await?;
        let mut dispatched = 0;

        for event in batch {
            let envelope = EventEnvelope {
                event_id: event.id,
                aggregate_type: event.aggregate_type.clone(),
                aggregate_id: event.aggregate_id,
                event_type: event.event_type.clone(),
                occurred_at: event.created_at,
                payload: event.payload.clone(),
            };
            let message = serde_json::to_string(&envelope)?;

            if self.in_flight.fetch_add(1, Ordering::AcqRel) >= self.config.max_in_flight {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                tracing::debug!("in-flight ceiling reached mid-batch, deferring remaining rows");
                break;
            }

            let store = Arc::clone(&self.store);
            let publisher = Arc::clone(&self.publisher);
            let in_flight = Arc::clone(&self.in_flight);
            let topic = self.config.topic.clone();
            let key = event.aggregate_id.to_string();
            let max_retries = self.config.max_retries;
            let event_id = event.id;

            tokio::spawn(async move {
                let bookkeeping = match publisher.publish(&topic, &key, &message).await {
                    Ok(()) => {
                        metrics::counter!("outbox_published_total").increment(1);
                        store.mark_sent(event_id).await
                    }
                    Err(e) => {
                        metrics::counter!("outbox_publish_failures_total").increment(1);
                        tracing::warn!(%event_id, error = %e, "outbox publish failed");
                        store.mark_failed(event_id, &e.to_string(), max_retries).await
                    }
                };
                if let Err(e) = bookkeeping {
                    tracing::error!(%event_id, error = %e, "outbox bookkeeping failed");
                }
                in_flight.fetch_sub(1, Ordering::AcqRel);
            });

            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// Number of dispatched publishes still awaiting acknowledgment.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Waits until every dispatched publish has been acknowledged and
    /// bookkept. Used on shutdown and in tests.
    pub async fn drain(&self) {
        while self.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
