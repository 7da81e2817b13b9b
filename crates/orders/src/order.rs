//! Order entity and status machine.

use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an order.
///
/// Transitions:
/// ```text
/// Created ──► Reserved ──┬──► Confirmed
///                        ├──► Expired
///                        └──► Canceled
/// ```
/// `Reserved` is the only state the three terminal states are reachable
/// from. Orders are never deleted, only terminal-stated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Persisted, inventory not yet held.
    #[default]
    Created,
    /// Inventory held, awaiting a payment outcome.
    Reserved,
    /// Payment succeeded, hold consumed (terminal).
    Confirmed,
    /// Deadline passed without a payment outcome, hold returned (terminal).
    Expired,
    /// Payment failed, hold returned (terminal).
    Canceled,
}

impl OrderStatus {
    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Reserved => "RESERVED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Canceled => "CANCELED",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(OrderStatus::Created),
            "RESERVED" => Some(OrderStatus::Reserved),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "EXPIRED" => Some(OrderStatus::Expired),
            "CANCELED" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Expired | OrderStatus::Canceled
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to place a single order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user_id: UserId,
    pub total_amount: i64,
}

/// The order row.
///
/// `version` increments on every persisted mutation and backs the
/// compare-and-swap write the orchestrator and the reaper race on.
/// `reservation_id` and `expires_at` are set together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total_amount: i64,
    pub status: OrderStatus,
    pub reservation_id: Option<ReservationId>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order in the created state.
    pub fn new(user_id: UserId, total_amount: i64) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            total_amount,
            status: OrderStatus::Created,
            reservation_id: None,
            expires_at: None,
            version: 0,
            created_at: Utc::now(),
        }
    }

    /// Records a granted reservation and its deadline.
    pub fn mark_reserved(&mut self, reservation_id: ReservationId, expires_at: DateTime<Utc>) {
        self.status = OrderStatus::Reserved;
        self.reservation_id = Some(reservation_id);
        self.expires_at = Some(expires_at);
    }
}

impl From<&OrderRequest> for Order {
    fn from(request: &OrderRequest) -> Self {
        Order::new(request.user_id, request.total_amount)
    }
}
