use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::{
    NewStagedEvent, OutboxError, OutboxStatus, OutboxStore, Result, StagedEvent, StagedEventId,
    StagingTransaction,
};

/// In-memory outbox table.
///
/// Enforces the same constraints as the `outbox_events` schema: IDs are
/// assigned in insertion order and at most one PENDING row may exist per
/// correlation key.
#[derive(Debug, Clone)]
pub struct OutboxTable {
    rows: BTreeMap<StagedEventId, StagedEvent>,
    pending_keys: HashSet<String>,
    next_id: i64,
}

impl Default for OutboxTable {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            pending_keys: HashSet::new(),
            next_id: 1,
        }
    }
}

impl OutboxTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a PENDING row.
    pub fn insert(&mut self, event: NewStagedEvent) -> Result<StagedEventId> {
        if self.has_pending(&event.correlation_key) {
            return Err(OutboxError::DuplicatePending {
                correlation_key: event.correlation_key,
            });
        }

        let id = StagedEventId::new(self.next_id);
        self.push(StagedEvent::pending(id, event, Utc::now()));
        Ok(id)
    }

    /// Returns true if a PENDING row exists for the key.
    pub fn has_pending(&self, correlation_key: &str) -> bool {
        self.pending_keys.contains(correlation_key)
    }

    pub fn get(&self, id: StagedEventId) -> Option<&StagedEvent> {
        self.rows.get(&id)
    }

    /// Moves a PENDING row to SENT.
    pub fn mark_sent(&mut self, id: StagedEventId) -> Result<()> {
        let row = self.rows.get_mut(&id).ok_or(OutboxError::NotFound(id))?;
        row.mark_sent()?;
        self.pending_keys.remove(&row.correlation_key);
        Ok(())
    }

    /// Counts a failed publish attempt and returns the updated row.
    pub fn record_failure(
        &mut self,
        id: StagedEventId,
        error: &str,
        max_retry_count: u32,
    ) -> Result<StagedEvent> {
        let row = self.rows.get_mut(&id).ok_or(OutboxError::NotFound(id))?;
        row.record_failed_attempt(error, max_retry_count)?;
        if row.status != OutboxStatus::Pending {
            self.pending_keys.remove(&row.correlation_key);
        }
        Ok(row.clone())
    }

    /// Rows in the given status, ordered by creation time then ID.
    pub fn by_status(&self, status: OutboxStatus, limit: usize) -> Vec<StagedEvent> {
        let mut rows: Vec<_> = self
            .rows
            .values()
            .filter(|row| row.status == status)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        rows.truncate(limit);
        rows
    }

    /// All rows in ID order.
    pub fn rows(&self) -> impl Iterator<Item = &StagedEvent> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn push(&mut self, row: StagedEvent) {
        self.next_id = self.next_id.max(row.id.as_i64() + 1);
        if row.status == OutboxStatus::Pending {
            self.pending_keys.insert(row.correlation_key.clone());
        }
        self.rows.insert(row.id, row);
    }
}

/// Business entities and their outbox, stored together.
#[derive(Debug, Clone, Default)]
pub struct LedgerState<T> {
    pub entities: T,
    pub outbox: OutboxTable,
}

/// In-memory ledger with local transactions, for tests and single-process runs.
///
/// A [`LedgerTransaction`] holds the write lock and works on a private copy
/// of the entities; outbox rows it stages are kept aside. Committing publishes
/// both; dropping the transaction discards them, so entity changes and staged
/// events are visible together or not at all.
///
/// The outbox is never copied, but the entities are, once per transaction.
/// Nothing is ever pruned either, so this backend suits tests and demos; a
/// long-running process should use the PostgreSQL stores.
pub struct InMemoryLedger<T> {
    state: Arc<RwLock<LedgerState<T>>>,
}

impl<T> Clone for InMemoryLedger<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Default> Default for InMemoryLedger<T> {
    fn default() -> Self {
        Self::with_entities(T::default())
    }
}

impl<T> InMemoryLedger<T> {
    /// Creates a ledger holding the given entities and an empty outbox.
    pub fn with_entities(entities: T) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState {
                entities,
                outbox: OutboxTable::new(),
            })),
        }
    }

    /// Runs a read-only closure against the committed state.
    pub async fn read<R>(&self, f: impl FnOnce(&LedgerState<T>) -> R) -> R {
        let state = self.state.read().await;
        f(&state)
    }
}

impl<T: Default> InMemoryLedger<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Clone> InMemoryLedger<T> {
    /// Opens a local transaction.
    ///
    /// Transactions on the same ledger are serialized.
    pub async fn begin(&self) -> LedgerTransaction<'_, T> {
        let guard = self.state.write().await;
        let entities = guard.entities.clone();
        LedgerTransaction {
            guard,
            entities,
            staged: Vec::new(),
        }
    }

    /// Returns a copy of the committed state.
    pub async fn snapshot(&self) -> LedgerState<T> {
        self.state.read().await.clone()
    }
}

/// An open local transaction on an [`InMemoryLedger`].
pub struct LedgerTransaction<'a, T> {
    guard: RwLockWriteGuard<'a, LedgerState<T>>,
    entities: T,
    staged: Vec<StagedEvent>,
}

impl<T> LedgerTransaction<'_, T> {
    pub fn entities(&self) -> &T {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut T {
        &mut self.entities
    }

    /// Rows staged by this transaction and not yet committed.
    pub fn staged(&self) -> &[StagedEvent] {
        &self.staged
    }

    /// Makes every change made through this transaction visible.
    pub fn commit(self) {
        let LedgerTransaction {
            mut guard,
            entities,
            staged,
        } = self;
        guard.entities = entities;
        for row in staged {
            guard.outbox.push(row);
        }
    }
}

#[async_trait]
impl<T: Send + Sync> StagingTransaction for LedgerTransaction<'_, T> {
    async fn insert_staged(&mut self, event: NewStagedEvent) -> Result<StagedEventId> {
        let key = event.correlation_key.as_str();
        let staged_here = self.staged.iter().any(|row| row.correlation_key == key);
        if staged_here || self.guard.outbox.has_pending(key) {
            return Err(OutboxError::DuplicatePending {
                correlation_key: event.correlation_key,
            });
        }

        let id = StagedEventId::new(self.guard.outbox.next_id + self.staged.len() as i64);
        self.staged.push(StagedEvent::pending(id, event, Utc::now()));
        Ok(id)
    }
}

#[async_trait]
impl<T: Send + Sync> OutboxStore for InMemoryLedger<T> {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<StagedEvent>> {
        let state = self.state.read().await;
        Ok(state.outbox.by_status(OutboxStatus::Pending, limit))
    }

    async fn mark_sent(&self, id: StagedEventId) -> Result<()> {
        self.state.write().await.outbox.mark_sent(id)
    }

    async fn record_failure(
        &self,
        id: StagedEventId,
        error: &str,
        max_retry_count: u32,
    ) -> Result<StagedEvent> {
        self.state
            .write()
            .await
            .outbox
            .record_failure(id, error, max_retry_count)
    }

    async fn get(&self, id: StagedEventId) -> Result<Option<StagedEvent>> {
        let state = self.state.read().await;
        Ok(state.outbox.get(id).cloned())
    }

    async fn list_by_status(&self, status: OutboxStatus, limit: usize) -> Result<Vec<StagedEvent>> {
        let state = self.state.read().await;
        Ok(state.outbox.by_status(status, limit))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::OutboxAppender;
    use common::{Money, OrderCreated, OrderId};

    type Ledger = InMemoryLedger<HashMap<i64, &'static str>>;

    fn staged(key: &str) -> NewStagedEvent {
        NewStagedEvent {
            correlation_key: key.to_string(),
            topic: "order-created".to_string(),
            event_type: "OrderCreated".to_string(),
            payload: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn committed_transaction_publishes_entity_and_event() {
        let ledger = Ledger::new();

        let mut tx = ledger.begin().await;
        tx.entities_mut().insert(42, "NEW");
        tx.append(&OrderCreated::new(OrderId::new(42), Money::from_cents(25000)))
            .await
            .unwrap();
        tx.commit();

        let state = ledger.snapshot().await;
        assert_eq!(state.entities.get(&42), Some(&"NEW"));
        assert_eq!(state.outbox.len(), 1);

        let pending = ledger.fetch_pending(10).await.unwrap();
        assert_eq!(pending[0].correlation_key, "42");
        assert_eq!(pending[0].status, OutboxStatus::Pending);
        assert_eq!(pending[0].retry_count, 0);
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let ledger = Ledger::new();

        {
            let mut tx = ledger.begin().await;
            tx.entities_mut().insert(42, "NEW");
            tx.insert_staged(staged("42")).await.unwrap();
            // dropped without commit
        }

        let state = ledger.snapshot().await;
        assert!(state.entities.is_empty());
        assert!(state.outbox.is_empty());
    }

    #[tokio::test]
    async fn second_pending_row_for_same_key_is_rejected() {
        let ledger = Ledger::new();
        let mut tx = ledger.begin().await;
        tx.insert_staged(staged("42")).await.unwrap();

        let result = tx.insert_staged(staged("42")).await;
        assert!(matches!(
            result,
            Err(OutboxError::DuplicatePending { ref correlation_key }) if correlation_key == "42"
        ));
    }

    #[tokio::test]
    async fn committed_pending_row_blocks_later_transaction() {
        let ledger = Ledger::new();
        let mut tx = ledger.begin().await;
        tx.insert_staged(staged("42")).await.unwrap();
        tx.commit();

        let mut tx = ledger.begin().await;
        let result = tx.insert_staged(staged("42")).await;
        assert!(matches!(result, Err(OutboxError::DuplicatePending { .. })));
        assert!(tx.staged().is_empty());
    }

    #[tokio::test]
    async fn transaction_ids_continue_from_committed_rows() {
        let ledger = Ledger::new();
        let mut tx = ledger.begin().await;
        for key in ["1", "2", "3"] {
            tx.insert_staged(staged(key)).await.unwrap();
        }
        tx.commit();

        let mut tx = ledger.begin().await;
        let fourth = tx.insert_staged(staged("4")).await.unwrap();
        let fifth = tx.insert_staged(staged("5")).await.unwrap();
        assert_eq!(tx.staged().len(), 2);
        // Not visible before commit.
        assert!(ledger.get(fourth).await.unwrap().is_none());
        tx.commit();

        assert_eq!(fourth, StagedEventId::new(4));
        assert_eq!(fifth, StagedEventId::new(5));
        assert_eq!(ledger.get(fifth).await.unwrap().unwrap().correlation_key, "5");
        assert_eq!(ledger.fetch_pending(10).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn failed_row_frees_its_key() {
        let ledger = Ledger::new();
        let mut tx = ledger.begin().await;
        let id = tx.insert_staged(staged("42")).await.unwrap();
        tx.commit();
        ledger.record_failure(id, "broker down", 1).await.unwrap();

        let mut tx = ledger.begin().await;
        assert!(tx.insert_staged(staged("42")).await.is_ok());
    }

    #[tokio::test]
    async fn key_can_be_staged_again_after_previous_row_is_sent() {
        let ledger = Ledger::new();
        let mut tx = ledger.begin().await;
        let first = tx.insert_staged(staged("42")).await.unwrap();
        tx.commit();

        ledger.mark_sent(first).await.unwrap();

        let mut tx = ledger.begin().await;
        let second = tx.insert_staged(staged("42")).await.unwrap();
        tx.commit();

        assert!(second > first);
        assert_eq!(ledger.list_by_status(OutboxStatus::Sent, 10).await.unwrap().len(), 1);
        assert_eq!(ledger.fetch_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_pending_is_oldest_first_and_bounded() {
        let ledger = Ledger::new();
        let mut tx = ledger.begin().await;
        for key in ["3", "1", "2"] {
            tx.insert_staged(staged(key)).await.unwrap();
        }
        tx.commit();

        let pending = ledger.fetch_pending(2).await.unwrap();
        let keys: Vec<_> = pending.iter().map(|r| r.correlation_key.as_str()).collect();
        assert_eq!(keys, vec!["3", "1"]);
    }

    #[tokio::test]
    async fn record_failure_moves_to_failed_at_max() {
        let ledger = Ledger::new();
        let mut tx = ledger.begin().await;
        let id = tx.insert_staged(staged("42")).await.unwrap();
        tx.commit();

        let row = ledger.record_failure(id, "broker down", 2).await.unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.retry_count, 1);

        let row = ledger.record_failure(id, "broker down", 2).await.unwrap();
        assert_eq!(row.status, OutboxStatus::Failed);
        assert_eq!(row.retry_count, 2);
        assert_eq!(row.last_error.as_deref(), Some("broker down"));

        assert!(ledger.fetch_pending(10).await.unwrap().is_empty());
        let result = ledger.mark_sent(id).await;
        assert!(matches!(result, Err(OutboxError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn unknown_row() {
        let ledger = Ledger::new();
        let missing = StagedEventId::new(99);
        assert!(ledger.get(missing).await.unwrap().is_none());
        assert!(matches!(
            ledger.mark_sent(missing).await,
            Err(OutboxError::NotFound(_))
        ));
    }
}
