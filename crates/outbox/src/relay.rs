//! Periodic relay from an outbox to the broker.

use std::time::Instant;

use broker::{OutgoingRecord, Publisher};
use common::RelayConfig;
use tokio::time::MissedTickBehavior;

use crate::{OutboxStatus, OutboxStore, Result, StagedEvent};

/// Header carrying the event type name of a relayed record.
pub const EVENT_TYPE_HEADER: &str = "event-type";

/// Counts for one relay tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Pending rows loaded.
    pub fetched: usize,
    /// Rows acknowledged by the broker and marked SENT.
    pub sent: usize,
    /// Rows whose publish failed but stay PENDING for a later tick.
    pub retried: usize,
    /// Rows that reached the retry limit on this tick and were marked FAILED.
    pub failed: usize,
}

/// Drains one outbox to the broker.
///
/// Each tick loads the oldest pending rows and publishes them one at a time,
/// in order, keyed by correlation key. A row is marked SENT only after the
/// broker acknowledges it; if marking fails after a successful publish the
/// row is published again on a later tick, which consumers absorb through
/// idempotency.
///
/// Exactly one scheduler should drain a given outbox.
pub struct RelayScheduler<S, P> {
    name: String,
    store: S,
    publisher: P,
    config: RelayConfig,
}

impl<S: OutboxStore, P: Publisher> RelayScheduler<S, P> {
    /// Creates a scheduler. `name` identifies the outbox in logs and metrics.
    pub fn new(name: impl Into<String>, store: S, publisher: P, config: RelayConfig) -> Self {
        Self {
            name: name.into(),
            store,
            publisher,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one relay pass.
    ///
    /// Publish failures are recorded on the row and never abort the tick.
    /// Store failures abort it; unprocessed rows are picked up next time.
    #[tracing::instrument(skip(self), fields(outbox = %self.name))]
    pub async fn tick(&self) -> Result<TickReport> {
        let started = Instant::now();
        let batch = self.store.fetch_pending(self.config.batch_size).await?;
        let mut report = TickReport {
            fetched: batch.len(),
            ..TickReport::default()
        };

        for event in batch {
            self.relay_one(event, &mut report).await?;
        }

        metrics::histogram!("relay_tick_duration_seconds", "outbox" => self.name.clone())
            .record(started.elapsed().as_secs_f64());
        if report.fetched > 0 {
            tracing::debug!(
                outbox = %self.name,
                fetched = report.fetched,
                sent = report.sent,
                retried = report.retried,
                failed = report.failed,
                "relay tick complete"
            );
        }
        Ok(report)
    }

    async fn relay_one(&self, event: StagedEvent, report: &mut TickReport) -> Result<()> {
        let record = OutgoingRecord::keyed(
            event.topic.clone(),
            event.correlation_key.clone(),
            event.payload.clone().into_bytes(),
        )
        .with_header(EVENT_TYPE_HEADER, event.event_type.clone());

        match self.publisher.publish(record).await {
            Ok(receipt) => {
                self.store.mark_sent(event.id).await?;
                report.sent += 1;
                metrics::counter!("outbox_published_total", "outbox" => self.name.clone(), "topic" => event.topic.clone())
                    .increment(1);
                tracing::debug!(
                    outbox = %self.name,
                    id = %event.id,
                    correlation_key = %event.correlation_key,
                    topic = %receipt.topic,
                    partition = receipt.partition,
                    offset = receipt.offset,
                    "event relayed"
                );
            }
            Err(e) => {
                let error = e.to_string();
                let row = self
                    .store
                    .record_failure(event.id, &error, self.config.max_retry_count)
                    .await?;
                metrics::counter!("outbox_publish_failures_total", "outbox" => self.name.clone(), "topic" => event.topic.clone())
                    .increment(1);

                if row.status == OutboxStatus::Failed {
                    report.failed += 1;
                    metrics::counter!("outbox_failed_total", "outbox" => self.name.clone(), "topic" => event.topic.clone())
                        .increment(1);
                    tracing::error!(
                        outbox = %self.name,
                        id = %row.id,
                        correlation_key = %row.correlation_key,
                        topic = %row.topic,
                        retry_count = row.retry_count,
                        error = %error,
                        "giving up on staged event"
                    );
                } else {
                    report.retried += 1;
                    tracing::warn!(
                        outbox = %self.name,
                        id = %row.id,
                        correlation_key = %row.correlation_key,
                        retry_count = row.retry_count,
                        error = %error,
                        "publish failed, will retry"
                    );
                }
            }
        }
        Ok(())
    }

    /// Ticks on the configured interval for the lifetime of the process.
    ///
    /// A tick never overlaps the previous one; a slow tick delays the next.
    pub async fn run(self) {
        tracing::info!(
            outbox = %self.name,
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            max_retry_count = self.config.max_retry_count,
            "relay started"
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                tracing::warn!(outbox = %self.name, error = %e, "relay tick failed");
            }
        }
    }
}
