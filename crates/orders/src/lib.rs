//! Order lifecycle orchestration.
//!
//! The [`OrderService`] drives the saga: placing a batch reserves
//! inventory with all-or-nothing compensation and records "reserved"
//! outbox events; payment outcomes arriving from the broker confirm or
//! cancel the reservation behind the idempotency gate. The
//! [`ExpirationReaper`] reconciles reservations whose deadline lapsed
//! without a payment outcome ever arriving.

mod error;
mod expiration;
mod memory;
mod order;
mod postgres;
mod repository;
mod service;

pub use error::OrderError;
pub use expiration::{ExpirationReaper, SweepStats};
pub use memory::InMemoryOrderRepository;
pub use order::{Order, OrderRequest, OrderStatus};
pub use postgres::PostgresOrderRepository;
pub use repository::OrderRepository;
pub use service::OrderService;

/// Convenience type alias for order results.
pub type Result<T> = std::result::Result<T, OrderError>;
