//! Order saga state machine.

use common::PaymentStatus;
use serde::{Deserialize, Serialize};

/// The state of an order in the payment saga.
///
/// State transitions:
/// ```text
/// New ──┬──► Prepared
///       └──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, waiting for the payment ledger.
    #[default]
    New,

    /// Payment succeeded (terminal state).
    Prepared,

    /// Payment failed (terminal state).
    Canceled,
}

impl OrderStatus {
    /// Returns true if a settlement can still be applied.
    pub fn can_settle(&self) -> bool {
        matches!(self, OrderStatus::New)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Prepared | OrderStatus::Canceled)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Prepared => "PREPARED",
            OrderStatus::Canceled => "CANCELED",
        }
    }

    /// Parses a stored status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(OrderStatus::New),
            "PREPARED" => Some(OrderStatus::Prepared),
            "CANCELED" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }
}

/// Status an order settles into for a given payment outcome.
impl From<PaymentStatus> for OrderStatus {
    fn from(outcome: PaymentStatus) -> Self {
        match outcome {
            PaymentStatus::Success => OrderStatus::Prepared,
            PaymentStatus::Failed => OrderStatus::Canceled,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_new() {
        assert_eq!(OrderStatus::default(), OrderStatus::New);
    }

    #[test]
    fn test_only_new_can_settle() {
        assert!(OrderStatus::New.can_settle());
        assert!(!OrderStatus::Prepared.can_settle());
        assert!(!OrderStatus::Canceled.can_settle());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(OrderStatus::Prepared.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_payment_outcome_mapping() {
        assert_eq!(OrderStatus::from(PaymentStatus::Success), OrderStatus::Prepared);
        assert_eq!(OrderStatus::from(PaymentStatus::Failed), OrderStatus::Canceled);
    }

    #[test]
    fn test_stored_names() {
        for status in [OrderStatus::New, OrderStatus::Prepared, OrderStatus::Canceled] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("CANCELLED"), None);
    }
}
