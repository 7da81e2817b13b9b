//! Wire format for events published from the outbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EventId;

/// The message written to the broker for every outbox row.
///
/// `payload` is itself a serialized domain event; consumers pick the
/// concrete payload type based on `event_type`. Field names are
/// camelCased on the wire so all services agree on the JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: String,
}

impl EventEnvelope {
    /// Deserializes the inner payload into a concrete domain event.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::PaymentCompletedPayload;
    use crate::{OrderId, ReservationId};

    #[test]
    fn envelope_uses_camel_case_on_the_wire() {
        let envelope = EventEnvelope {
            event_id: EventId::new(),
            aggregate_type: "ORDER".to_string(),
            aggregate_id: Uuid::new_v4(),
            event_type: "ORDER_RESERVED".to_string(),
            occurred_at: Utc::now(),
            payload: "{}".to_string(),
        };

        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("eventId").is_some());
        assert!(json.get("aggregateType").is_some());
        assert!(json.get("occurredAt").is_some());
        assert!(json.get("event_id").is_none());
    }

    #[test]
    fn payload_as_decodes_inner_event() {
        let inner = PaymentCompletedPayload {
            payment_id: Uuid::new_v4(),
            order_id: OrderId::new(),
            reservation_id: Some(ReservationId::new()),
            amount: 4200,
            completed_at: Utc::now(),
        };
        let envelope = EventEnvelope {
            event_id: EventId::new(),
            aggregate_type: "PAYMENT".to_string(),
            aggregate_id: Uuid::new_v4(),
            event_type: "PAYMENT_COMPLETED".to_string(),
            occurred_at: Utc::now(),
            payload: serde_json::to_string(&inner).unwrap(),
        };

        let decoded: PaymentCompletedPayload = envelope.payload_as().unwrap();
        assert_eq!(decoded.order_id, inner.order_id);
        assert_eq!(decoded.amount, 4200);
    }

    #[test]
    fn payload_as_rejects_garbage() {
        let envelope = EventEnvelope {
            event_id: EventId::new(),
            aggregate_type: "PAYMENT".to_string(),
            aggregate_id: Uuid::new_v4(),
            event_type: "PAYMENT_COMPLETED".to_string(),
            occurred_at: Utc::now(),
            payload: "not json".to_string(),
        };

        let decoded: Result<PaymentCompletedPayload, _> = envelope.payload_as();
        assert!(decoded.is_err());
    }
}
