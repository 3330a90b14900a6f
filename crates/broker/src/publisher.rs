use std::sync::Arc;

use async_trait::async_trait;

use crate::{ConsumerRecord, DeliveryReceipt, OutgoingRecord, Result};

/// Appends records to the broker.
///
/// `publish` resolves only once the broker reports the record as durably
/// replicated; a returned error means the caller must assume the record was
/// not written and retry later.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, record: OutgoingRecord) -> Result<DeliveryReceipt>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn publish(&self, record: OutgoingRecord) -> Result<DeliveryReceipt> {
        (**self).publish(record).await
    }
}

/// A consumer-group member reading a single assigned partition.
#[async_trait]
pub trait Subscription: Send {
    /// Topic this subscription reads.
    fn topic(&self) -> &str;

    /// Partition this subscription reads.
    fn partition(&self) -> i32;

    /// Returns the next record, or `None` when the partition is drained for now.
    async fn poll(&mut self) -> Result<Option<ConsumerRecord>>;

    /// Commits the group's offset past `record`.
    async fn commit(&mut self, record: &ConsumerRecord) -> Result<()>;

    /// Moves the read position back to `offset` so the record is delivered again.
    async fn seek(&mut self, offset: i64) -> Result<()>;
}

#[async_trait]
impl<S: Subscription + ?Sized> Subscription for Box<S> {
    fn topic(&self) -> &str {
        (**self).topic()
    }

    fn partition(&self) -> i32 {
        (**self).partition()
    }

    async fn poll(&mut self) -> Result<Option<ConsumerRecord>> {
        (**self).poll().await
    }

    async fn commit(&mut self, record: &ConsumerRecord) -> Result<()> {
        (**self).commit(record).await
    }

    async fn seek(&mut self, offset: i64) -> Result<()> {
        (**self).seek(offset).await
    }
}
