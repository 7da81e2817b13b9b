//! Shared types for the order saga system.
//!
//! Identifier newtypes, the wire event envelope, and the domain event
//! payloads exchanged between the order, payment and shipping services.

mod envelope;
mod payloads;
mod types;

pub use envelope::EventEnvelope;
pub use payloads::{
    AGGREGATE_ORDER, EVENT_ORDER_CANCELED, EVENT_ORDER_CONFIRMED, EVENT_ORDER_RESERVED,
    EVENT_PAYMENT_COMPLETED, EVENT_PAYMENT_FAILED, OrderCanceledPayload, OrderConfirmedPayload,
    OrderReservedPayload, PaymentCompletedPayload, PaymentFailedPayload,
};
pub use types::{EventId, OrderId, ReservationId, UserId};
