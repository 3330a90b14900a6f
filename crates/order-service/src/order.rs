use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentStatus};
use serde::{Deserialize, Serialize};

use crate::OrderStatus;

/// An order owned by the order ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub amount: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of applying a settlement to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The order moved out of `New`.
    Applied { from: OrderStatus, to: OrderStatus },
    /// The order was already settled; nothing changed.
    Skipped { current: OrderStatus },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

impl Order {
    /// Creates a new order in status `New`.
    pub fn new(id: OrderId, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id,
            amount,
            status: OrderStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a payment outcome.
    ///
    /// Only a `New` order transitions; any later settlement is skipped so a
    /// duplicate never changes a resolved order.
    pub fn apply_settlement(&mut self, outcome: PaymentStatus) -> Transition {
        if !self.status.can_settle() {
            return Transition::Skipped {
                current: self.status,
            };
        }

        let from = self.status;
        self.status = OrderStatus::from(outcome);
        self.updated_at = Utc::now();
        Transition::Applied {
            from,
            to: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new(OrderId::new(42), Money::from_cents(25000))
    }

    #[test]
    fn new_order_is_new() {
        let order = order();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.created_at, order.updated_at);
    }

    #[test]
    fn success_prepares() {
        let mut order = order();
        let transition = order.apply_settlement(PaymentStatus::Success);
        assert_eq!(
            transition,
            Transition::Applied {
                from: OrderStatus::New,
                to: OrderStatus::Prepared
            }
        );
        assert_eq!(order.status, OrderStatus::Prepared);
    }

    #[test]
    fn failure_cancels() {
        let mut order = order();
        order.apply_settlement(PaymentStatus::Failed);
        assert_eq!(order.status, OrderStatus::Canceled);
    }

    #[test]
    fn second_settlement_is_skipped() {
        let mut order = order();
        order.apply_settlement(PaymentStatus::Success);

        let transition = order.apply_settlement(PaymentStatus::Failed);
        assert_eq!(
            transition,
            Transition::Skipped {
                current: OrderStatus::Prepared
            }
        );
        assert!(!transition.is_applied());
        assert_eq!(order.status, OrderStatus::Prepared);
    }
}
