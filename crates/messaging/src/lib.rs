//! Reliable event delivery over an at-least-once transport.
//!
//! Two halves of the same contract live here. The producing side is the
//! transactional outbox: domain events are appended to a ledger in the
//! same unit of work as the state change that produced them, and the
//! [`OutboxRelay`] later pushes pending rows to the broker. The consuming
//! side is the [`IdempotencyGate`], which absorbs the duplicate
//! deliveries the relay is allowed to produce.

mod error;
mod idempotency;
mod memory;
mod outbox;
mod postgres;
mod publisher;
mod relay;
mod store;

pub use error::MessagingError;
pub use idempotency::{DedupStore, IdempotencyGate, IdempotencyOutcome, InMemoryDedupStore};
pub use memory::InMemoryOutboxStore;
pub use outbox::{MAX_LAST_ERROR_LEN, OutboxEvent, OutboxStatus};
pub use postgres::{
    PostgresDedupStore, PostgresOutboxStore, insert_outbox_events, record_processed_event,
};
pub use publisher::{EventPublisher, InMemoryPublisher, PublishedMessage, TracingPublisher};
pub use relay::{OutboxRelay, RelayConfig};
pub use store::OutboxStore;

/// Convenience type alias for messaging results.
pub type Result<T> = std::result::Result<T, MessagingError>;
