use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, OrderId, PaymentStatus};

use crate::{Result, Settlement};

/// Persistence for settlements.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Loads the settlement of an order, if any.
    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Settlement>>;

    /// Records a settlement and stages its `PaymentSettled` event in one
    /// local transaction.
    ///
    /// Fails with [`crate::PaymentError::AlreadySettled`] if the order has a
    /// settlement already; nothing is written in that case.
    async fn record_settlement(
        &self,
        order_id: OrderId,
        amount: Money,
        status: PaymentStatus,
    ) -> Result<Settlement>;
}

#[async_trait]
impl<S: SettlementStore + ?Sized> SettlementStore for Arc<S> {
    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Settlement>> {
        (**self).find_by_order(order_id).await
    }

    async fn record_settlement(
        &self,
        order_id: OrderId,
        amount: Money,
        status: PaymentStatus,
    ) -> Result<Settlement> {
        (**self).record_settlement(order_id, amount, status).await
    }
}
