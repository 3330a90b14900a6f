use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentSettled, PaymentStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The payment ledger's record of how an order's payment was settled.
///
/// At most one exists per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Settlement {
    pub fn new(order_id: OrderId, amount: Money, status: PaymentStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            amount,
            status,
            created_at: Utc::now(),
        }
    }

    /// The event announcing this settlement to the order ledger.
    pub fn to_event(&self) -> PaymentSettled {
        PaymentSettled::new(self.order_id, self.id.to_string(), self.status)
    }
}
