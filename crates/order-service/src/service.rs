//! Order service providing the business entry points of the order ledger.

use common::{Money, OrderId};

use crate::{Order, OrderError, OrderStore, Result};

/// Service for placing and inspecting orders.
pub struct OrderService<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order and starts its payment saga.
    ///
    /// Returns once the order and its `OrderCreated` event are committed;
    /// settlement happens asynchronously.
    #[tracing::instrument(skip(self))]
    pub async fn place_order(&self, amount: Money) -> Result<Order> {
        if !amount.is_positive() {
            return Err(OrderError::InvalidAmount(amount));
        }

        let order = self.store.create_order(amount).await?;
        tracing::info!(order_id = %order.id, amount = %order.amount, "order placed");
        Ok(order)
    }

    /// Gets an order by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.store.get(id).await?.ok_or(OrderError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use outbox::OutboxStore;

    use super::*;
    use crate::{InMemoryOrderStore, OrderStatus};

    #[tokio::test]
    async fn place_order_creates_new_order() {
        let service = OrderService::new(InMemoryOrderStore::new());
        let order = service.place_order(Money::from_cents(1999)).await.unwrap();

        assert_eq!(order.status, OrderStatus::New);
        let fetched = service.get_order(order.id).await.unwrap();
        assert_eq!(fetched, order);
    }

    #[tokio::test]
    async fn non_positive_amount_is_rejected_without_side_effects() {
        let store = InMemoryOrderStore::new();
        let service = OrderService::new(store.clone());

        for amount in [Money::zero(), Money::from_cents(-5)] {
            let result = service.place_order(amount).await;
            assert!(matches!(result, Err(OrderError::InvalidAmount(_))));
        }
        assert_eq!(store.order_count().await, 0);
        assert!(store.outbox().fetch_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_order() {
        let service = OrderService::new(InMemoryOrderStore::new());
        let result = service.get_order(OrderId::new(404)).await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }
}
