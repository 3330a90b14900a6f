//! Event bodies exchanged between the order and payment ledgers.
//!
//! Every record is keyed by the order ID's string form, so all events about
//! one order land on the same partition.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Money, OrderId};

/// Topic carrying `OrderCreated` from the order ledger to the payment ledger.
pub const ORDER_CREATED_TOPIC: &str = "order-created";

/// Topic carrying `PaymentSettled` from the payment ledger back to the order ledger.
pub const PAYMENT_SETTLED_TOPIC: &str = "payment-settled";

/// Errors raised while decoding an incoming event body.
///
/// None of these can be fixed by redelivering the same bytes.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The body is not valid JSON for the expected event.
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The body decoded but violates a structural rule.
    #[error("Invalid payload: {0}")]
    Invalid(String),
}

/// Outcome of settling an order's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// The payment went through.
    Success,
    /// The payment was declined.
    Failed,
}

impl PaymentStatus {
    /// Returns the status name as stored and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }

    /// Parses a stored status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(PaymentStatus::Success),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Staged by the order ledger in the same transaction that creates the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub amount: Money,
}

impl OrderCreated {
    /// Event type name stored on the outbox row.
    pub const EVENT_TYPE: &'static str = "OrderCreated";

    pub fn new(order_id: OrderId, amount: Money) -> Self {
        Self { order_id, amount }
    }

    /// Decodes and validates a record value.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ContractError> {
        let event: Self = serde_json::from_slice(bytes)?;
        if !event.amount.is_positive() {
            return Err(ContractError::Invalid(format!(
                "order {} has non-positive amount {}",
                event.order_id, event.amount
            )));
        }
        Ok(event)
    }
}

/// Staged by the payment ledger in the same transaction that records the settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSettled {
    pub order_id: OrderId,
    pub payment_id: String,
    pub status: PaymentStatus,
}

impl PaymentSettled {
    /// Event type name stored on the outbox row.
    pub const EVENT_TYPE: &'static str = "PaymentSettled";

    pub fn new(order_id: OrderId, payment_id: impl Into<String>, status: PaymentStatus) -> Self {
        Self {
            order_id,
            payment_id: payment_id.into(),
            status,
        }
    }

    /// Decodes and validates a record value.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ContractError> {
        let event: Self = serde_json::from_slice(bytes)?;
        if event.payment_id.trim().is_empty() {
            return Err(ContractError::Invalid(format!(
                "settlement for order {} has no payment id",
                event.order_id
            )));
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_status_wire_names() {
        let json = serde_json::to_string(&PaymentStatus::Success).unwrap();
        assert_eq!(json, "\"SUCCESS\"");
        assert_eq!(PaymentStatus::parse("FAILED"), Some(PaymentStatus::Failed));
        assert_eq!(PaymentStatus::parse("PENDING"), None);
    }

    #[test]
    fn order_created_decodes_valid_body() {
        let body = br#"{"order_id":42,"amount":{"cents":25000}}"#;
        let event = OrderCreated::from_slice(body).unwrap();
        assert_eq!(event.order_id, OrderId::new(42));
        assert_eq!(event.amount, Money::from_cents(25000));
    }

    #[test]
    fn order_created_rejects_garbage() {
        let err = OrderCreated::from_slice(b"not json").unwrap_err();
        assert!(matches!(err, ContractError::Malformed(_)));
    }

    #[test]
    fn order_created_rejects_zero_amount() {
        let body = br#"{"order_id":42,"amount":{"cents":0}}"#;
        let err = OrderCreated::from_slice(body).unwrap_err();
        assert!(matches!(err, ContractError::Invalid(_)));
    }

    #[test]
    fn payment_settled_decodes_valid_body() {
        let body = br#"{"order_id":42,"payment_id":"PAY-1","status":"SUCCESS"}"#;
        let event = PaymentSettled::from_slice(body).unwrap();
        assert_eq!(event.status, PaymentStatus::Success);
    }

    #[test]
    fn payment_settled_rejects_unknown_status() {
        let body = br#"{"order_id":42,"payment_id":"PAY-1","status":"MAYBE"}"#;
        assert!(matches!(
            PaymentSettled::from_slice(body),
            Err(ContractError::Malformed(_))
        ));
    }

    #[test]
    fn payment_settled_rejects_blank_payment_id() {
        let body = br#"{"order_id":42,"payment_id":" ","status":"FAILED"}"#;
        assert!(matches!(
            PaymentSettled::from_slice(body),
            Err(ContractError::Invalid(_))
        ));
    }
}
