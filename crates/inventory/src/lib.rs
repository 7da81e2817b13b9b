//! Stock reservation engine.
//!
//! A shared stock counter plus TTL-bounded holds. `reserve` converts one
//! unit of available stock into a hold, `commit` consumes the hold
//! permanently, and `release` returns the unit to availability. Every
//! mutation is a single atomic operation against the backing store —
//! the counters are never read and then written from application code,
//! which is what keeps concurrent reservations from driving stock past
//! zero.

mod error;
mod memory;
mod postgres;
mod store;

pub use error::InventoryError;
pub use memory::InMemoryReservationStore;
pub use postgres::PostgresReservationStore;
pub use store::{ReservationStore, StockSummary};

/// Convenience type alias for inventory results.
pub type Result<T> = std::result::Result<T, InventoryError>;
