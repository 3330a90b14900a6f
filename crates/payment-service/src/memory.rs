use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{Money, OrderId, PaymentStatus};
use outbox::{InMemoryLedger, OutboxAppender};

use crate::{PaymentError, Result, Settlement, SettlementStore};

/// Settlements held by an [`InMemorySettlementStore`], keyed by order.
#[derive(Debug, Clone, Default)]
pub struct SettlementTable {
    by_order: BTreeMap<OrderId, Settlement>,
}

impl SettlementTable {
    pub fn get(&self, order_id: OrderId) -> Option<&Settlement> {
        self.by_order.get(&order_id)
    }

    pub fn len(&self) -> usize {
        self.by_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_order.is_empty()
    }
}

/// In-memory settlement store for testing and single-process runs.
#[derive(Clone, Default)]
pub struct InMemorySettlementStore {
    ledger: InMemoryLedger<SettlementTable>,
    unavailable: Arc<AtomicBool>,
}

impl InMemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The outbox sharing this store's transactions.
    pub fn outbox(&self) -> InMemoryLedger<SettlementTable> {
        self.ledger.clone()
    }

    /// Makes every operation fail as if the database were down.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Returns the number of settlements stored.
    pub async fn settlement_count(&self) -> usize {
        self.ledger.read(|state| state.entities.len()).await
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable(
                "in-memory settlement store is down".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SettlementStore for InMemorySettlementStore {
    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Settlement>> {
        self.check_available()?;
        Ok(self
            .ledger
            .read(|state| state.entities.get(order_id).cloned())
            .await)
    }

    async fn record_settlement(
        &self,
        order_id: OrderId,
        amount: Money,
        status: PaymentStatus,
    ) -> Result<Settlement> {
        self.check_available()?;
        let mut tx = self.ledger.begin().await;

        // Unique constraint on order_id
        if tx.entities().by_order.contains_key(&order_id) {
            return Err(PaymentError::AlreadySettled(order_id));
        }

        let settlement = Settlement::new(order_id, amount, status);
        tx.entities_mut()
            .by_order
            .insert(order_id, settlement.clone());
        tx.append(&settlement.to_event()).await?;

        tx.commit();
        Ok(settlement)
    }
}

#[cfg(test)]
mod tests {
    use common::PaymentSettled;
    use outbox::OutboxStore;

    use super::*;

    #[tokio::test]
    async fn settlement_and_event_commit_together() {
        let store = InMemorySettlementStore::new();
        let settlement = store
            .record_settlement(OrderId::new(42), Money::from_dollars(250), PaymentStatus::Success)
            .await
            .unwrap();

        let found = store.find_by_order(OrderId::new(42)).await.unwrap();
        assert_eq!(found, Some(settlement.clone()));

        let pending = store.outbox().fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].topic, "payment-settled");
        assert_eq!(pending[0].correlation_key, "42");
        let event = PaymentSettled::from_slice(pending[0].payload.as_bytes()).unwrap();
        assert_eq!(event.payment_id, settlement.id.to_string());
        assert_eq!(event.status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn second_settlement_for_order_is_rejected() {
        let store = InMemorySettlementStore::new();
        let id = OrderId::new(42);
        store
            .record_settlement(id, Money::from_cents(100), PaymentStatus::Success)
            .await
            .unwrap();

        let result = store
            .record_settlement(id, Money::from_cents(100), PaymentStatus::Failed)
            .await;
        assert!(matches!(result, Err(PaymentError::AlreadySettled(_))));
        assert_eq!(store.settlement_count().await, 1);
        assert_eq!(store.outbox().fetch_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn outage() {
        let store = InMemorySettlementStore::new();
        store.set_available(false);
        let result = store.find_by_order(OrderId::new(1)).await;
        assert!(matches!(result, Err(PaymentError::Unavailable(_))));
    }
}
