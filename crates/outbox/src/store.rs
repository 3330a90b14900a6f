use std::sync::Arc;

use async_trait::async_trait;

use crate::{OutboxStatus, Result, StagedEvent, StagedEventId};

/// Relay-side access to an outbox.
///
/// Rows are created by [`crate::OutboxAppender`] inside business
/// transactions; after that, only the relay mutates them through this trait.
/// Rows are never deleted.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Loads up to `limit` PENDING rows, oldest first.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<StagedEvent>>;

    /// Moves a PENDING row to SENT.
    async fn mark_sent(&self, id: StagedEventId) -> Result<()>;

    /// Counts a failed publish attempt against a PENDING row.
    ///
    /// The row moves to FAILED once `retry_count` reaches `max_retry_count`.
    /// Returns the updated row.
    async fn record_failure(
        &self,
        id: StagedEventId,
        error: &str,
        max_retry_count: u32,
    ) -> Result<StagedEvent>;

    /// Loads a row by ID.
    async fn get(&self, id: StagedEventId) -> Result<Option<StagedEvent>>;

    /// Lists rows in a given status, oldest first.
    async fn list_by_status(&self, status: OutboxStatus, limit: usize) -> Result<Vec<StagedEvent>>;
}

#[async_trait]
impl<S: OutboxStore + ?Sized> OutboxStore for Arc<S> {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<StagedEvent>> {
        (**self).fetch_pending(limit).await
    }

    async fn mark_sent(&self, id: StagedEventId) -> Result<()> {
        (**self).mark_sent(id).await
    }

    async fn record_failure(
        &self,
        id: StagedEventId,
        error: &str,
        max_retry_count: u32,
    ) -> Result<StagedEvent> {
        (**self).record_failure(id, error, max_retry_count).await
    }

    async fn get(&self, id: StagedEventId) -> Result<Option<StagedEvent>> {
        (**self).get(id).await
    }

    async fn list_by_status(&self, status: OutboxStatus, limit: usize) -> Result<Vec<StagedEvent>> {
        (**self).list_by_status(status, limit).await
    }
}
