use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use common::{Money, OrderCreated, OrderId, PaymentStatus};
use outbox::{InMemoryLedger, OutboxAppender};

use crate::{Order, OrderError, OrderStore, Result, Transition};

/// Orders held by an [`InMemoryOrderStore`].
#[derive(Debug, Clone)]
pub struct OrderTable {
    orders: BTreeMap<OrderId, Order>,
    next_id: i64,
}

impl Default for OrderTable {
    fn default() -> Self {
        Self {
            orders: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl OrderTable {
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[derive(Default)]
struct Faults {
    unavailable: AtomicBool,
    failing_commits: AtomicU32,
}

/// In-memory order store for testing and single-process runs.
///
/// Orders and their outbox live in one [`InMemoryLedger`], so the relay for
/// this ledger drains [`InMemoryOrderStore::outbox`].
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    ledger: InMemoryLedger<OrderTable>,
    faults: Arc<Faults>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose first order gets `first_id`.
    pub fn starting_at(first_id: i64) -> Self {
        Self {
            ledger: InMemoryLedger::with_entities(OrderTable {
                orders: BTreeMap::new(),
                next_id: first_id,
            }),
            faults: Arc::default(),
        }
    }

    /// The outbox sharing this store's transactions.
    pub fn outbox(&self) -> InMemoryLedger<OrderTable> {
        self.ledger.clone()
    }

    /// Makes every operation fail as if the database were down.
    pub fn set_available(&self, available: bool) {
        self.faults.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Fails the next `count` transactions after all their writes, right
    /// before commit, as if the process died at that point.
    pub fn fail_next_commits(&self, count: u32) {
        self.faults.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.ledger.read(|state| state.entities.len()).await
    }

    fn check_available(&self) -> Result<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(OrderError::Unavailable("in-memory order store is down".to_string()));
        }
        Ok(())
    }

    fn check_commit(&self) -> Result<()> {
        let injected = self
            .faults
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(OrderError::Unavailable("commit aborted".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, amount: Money) -> Result<Order> {
        self.check_available()?;
        let mut tx = self.ledger.begin().await;

        let table = tx.entities_mut();
        let order = Order::new(OrderId::new(table.next_id), amount);
        table.next_id += 1;
        table.orders.insert(order.id, order.clone());

        tx.append(&OrderCreated::new(order.id, order.amount)).await?;

        self.check_commit()?;
        tx.commit();
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        self.check_available()?;
        Ok(self.ledger.read(|state| state.entities.get(id).cloned()).await)
    }

    async fn apply_settlement(&self, id: OrderId, outcome: PaymentStatus) -> Result<Transition> {
        self.check_available()?;
        let mut tx = self.ledger.begin().await;

        let order = tx
            .entities_mut()
            .orders
            .get_mut(&id)
            .ok_or(OrderError::NotFound(id))?;
        let transition = order.apply_settlement(outcome);
        if !transition.is_applied() {
            return Ok(transition);
        }

        self.check_commit()?;
        tx.commit();
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use outbox::{OutboxStatus, OutboxStore};

    use super::*;
    use crate::OrderStatus;

    #[tokio::test]
    async fn create_order_stages_order_created() {
        let store = InMemoryOrderStore::starting_at(42);
        let order = store.create_order(Money::from_dollars(250)).await.unwrap();

        assert_eq!(order.id, OrderId::new(42));
        assert_eq!(order.status, OrderStatus::New);

        let pending = store.outbox().fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].correlation_key, "42");
        assert_eq!(pending[0].topic, "order-created");
        let event = OrderCreated::from_slice(pending[0].payload.as_bytes()).unwrap();
        assert_eq!(event.amount, Money::from_cents(25000));
    }

    #[tokio::test]
    async fn aborted_commit_leaves_neither_order_nor_event() {
        let store = InMemoryOrderStore::new();
        store.fail_next_commits(1);

        let result = store.create_order(Money::from_cents(100)).await;
        assert!(matches!(result, Err(OrderError::Unavailable(_))));
        assert_eq!(store.order_count().await, 0);
        assert!(store.outbox().fetch_pending(10).await.unwrap().is_empty());

        // The next attempt goes through and reuses the unclaimed ID.
        let order = store.create_order(Money::from_cents(100)).await.unwrap();
        assert_eq!(order.id, OrderId::new(1));
        assert_eq!(store.order_count().await, 1);
        assert_eq!(store.outbox().fetch_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn settlement_applies_once() {
        let store = InMemoryOrderStore::new();
        let order = store.create_order(Money::from_cents(100)).await.unwrap();

        let first = store
            .apply_settlement(order.id, PaymentStatus::Success)
            .await
            .unwrap();
        assert!(first.is_applied());

        let second = store
            .apply_settlement(order.id, PaymentStatus::Failed)
            .await
            .unwrap();
        assert_eq!(
            second,
            Transition::Skipped {
                current: OrderStatus::Prepared
            }
        );
        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Prepared);
    }

    #[tokio::test]
    async fn aborted_settlement_keeps_order_new() {
        let store = InMemoryOrderStore::new();
        let order = store.create_order(Money::from_cents(100)).await.unwrap();
        store.fail_next_commits(1);

        assert!(
            store
                .apply_settlement(order.id, PaymentStatus::Success)
                .await
                .is_err()
        );
        let stored = store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::New);
    }

    #[tokio::test]
    async fn unknown_order_settlement() {
        let store = InMemoryOrderStore::new();
        let result = store
            .apply_settlement(OrderId::new(9), PaymentStatus::Success)
            .await;
        assert!(matches!(result, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn outage_fails_reads_and_writes() {
        let store = InMemoryOrderStore::new();
        store.set_available(false);
        assert!(matches!(
            store.get(OrderId::new(1)).await,
            Err(OrderError::Unavailable(_))
        ));

        store.set_available(true);
        assert!(store.get(OrderId::new(1)).await.unwrap().is_none());
        // Outbox rows of this ledger stay queryable for the relay.
        assert!(
            store
                .outbox()
                .list_by_status(OutboxStatus::Failed, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
