//! Outbox ledger row model.

use chrono::{DateTime, Utc};
use common::EventId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Diagnostic text stored in `last_error` is capped at this many chars.
pub const MAX_LAST_ERROR_LEN: usize = 2000;

/// Delivery status of an outbox row.
///
/// Transitions: `Pending → Sent` (terminal) or `Pending → Pending`
/// (retry) until the retry ceiling flips the row to `Failed` (inert,
/// operator intervention required).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OutboxStatus {
    /// Written but not yet acknowledged by the broker.
    #[default]
    Pending,
    /// Acknowledged by the broker (terminal).
    Sent,
    /// Retry ceiling reached, no further automatic attempts (terminal).
    Failed,
}

impl OutboxStatus {
    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
            OutboxStatus::Failed => "FAILED",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OutboxStatus::Pending),
            "SENT" => Some(OutboxStatus::Sent),
            "FAILED" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single row of the outbox ledger.
///
/// Rows are created in the same local transaction as the business state
/// change they announce, and afterwards mutated only by the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub id: EventId,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: String,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Creates a fresh pending row with a new event id.
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: Uuid,
        event_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            event_type: event_type.into(),
            payload: payload.into(),
            status: OutboxStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: Utc::now(),
            sent_at: None,
        }
    }
}

/// Truncates a publish error message for storage in `last_error`.
pub(crate) fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_LAST_ERROR_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rows_start_pending_with_zero_retries() {
        let event = OutboxEvent::new("ORDER", Uuid::new_v4(), "ORDER_RESERVED", "{}");
        assert_eq!(event.status, OutboxStatus::Pending);
        assert_eq!(event.retry_count, 0);
        assert!(event.last_error.is_none());
        assert!(event.sent_at.is_none());
    }

    #[test]
    fn status_parse_roundtrip() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Sent,
            OutboxStatus::Failed,
        ] {
            assert_eq!(OutboxStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OutboxStatus::parse("DELIVERED"), None);
    }

    #[test]
    fn truncate_error_caps_length() {
        let long = "x".repeat(5000);
        assert_eq!(truncate_error(&long).len(), MAX_LAST_ERROR_LEN);
        assert_eq!(truncate_error("short"), "short");
    }
}
