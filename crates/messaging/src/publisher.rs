//! Broker publisher seam.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::MessagingError;

/// Trait for publishing serialized envelopes to the broker.
///
/// Messages are keyed so the broker can preserve per-aggregate ordering
/// at the partition level. A returned `Ok` means the broker acknowledged
/// the message; an `Err` may still have delivered it, which is why
/// consumers must be idempotent.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one message to `topic`, partitioned by `key`.
    async fn publish(&self, topic: &str, key: &str, payload: &str)
    -> Result<(), MessagingError>;
}

/// Publisher that writes each message to the structured log instead of
/// a broker. Default sink for deployments without one; consumers tail
/// the log stream or swap in a real broker client behind the same trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

impl TracingPublisher {
    /// Creates a new tracing publisher.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for TracingPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), MessagingError> {
        tracing::info!(target: "event_publisher", topic, key, payload, "event published");
        Ok(())
    }
}

/// A message captured by [`InMemoryPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    messages: Vec<PublishedMessage>,
    fail_next: usize,
}

/// In-memory publisher for testing.
///
/// Records every acknowledged message and can be told to fail the next
/// N publish calls to exercise the relay's retry path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publish calls fail.
    pub fn fail_next(&self, count: usize) {
        self.state.write().unwrap().fail_next = count;
    }

    /// Returns all acknowledged messages in publish order.
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.state.read().unwrap().messages.clone()
    }

    /// Returns the number of acknowledged messages.
    pub fn message_count(&self) -> usize {
        self.state.read().unwrap().messages.len()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), MessagingError> {
        let mut state = self.state.write().unwrap();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(MessagingError::Publish("injected broker failure".to_string()));
        }
        state.messages.push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}
