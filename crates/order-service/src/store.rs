use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, OrderId, PaymentStatus};

use crate::{Order, Result, Transition};

/// Persistence for orders.
///
/// Every mutation runs in one local transaction together with the outbox
/// rows it stages.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Creates an order in status `New` and stages its `OrderCreated` event.
    async fn create_order(&self, amount: Money) -> Result<Order>;

    /// Loads an order by ID.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Applies a payment outcome to an order.
    ///
    /// The status guard is evaluated under the transaction's lock, so two
    /// concurrent deliveries of the same settlement apply it once.
    async fn apply_settlement(&self, id: OrderId, outcome: PaymentStatus) -> Result<Transition>;
}

#[async_trait]
impl<S: OrderStore + ?Sized> OrderStore for Arc<S> {
    async fn create_order(&self, amount: Money) -> Result<Order> {
        (**self).create_order(amount).await
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).get(id).await
    }

    async fn apply_settlement(&self, id: OrderId, outcome: PaymentStatus) -> Result<Transition> {
        (**self).apply_settlement(id, outcome).await
    }
}
