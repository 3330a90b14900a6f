//! Partition listener: apply, then commit; retry transient failures with
//! backoff; forward everything else to the dead-letter topic.

use std::time::Duration;

use async_trait::async_trait;
use common::BackoffConfig;
use thiserror::Error;

use crate::topic::headers;
use crate::{
    ConsumerRecord, ExponentialBackoff, OutgoingRecord, Publisher, Result, Subscription,
    dead_letter_topic,
};

/// Failure reported by a [`MessageHandler`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// May succeed if retried (e.g. the local store is unavailable).
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Retrying cannot help (malformed payload, validation failure).
    #[error("Non-retryable failure: {0}")]
    NonRetryable(String),
}

/// Applies one broker record to local state.
///
/// Handlers must be idempotent: the same record may be delivered more than once.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, record: &ConsumerRecord) -> std::result::Result<(), HandlerError>;
}

/// Why a record ended up on the dead-letter topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient failures outlasted the backoff budget.
    TransientExhausted,
    /// The handler rejected the record outright.
    NonRetryable,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransientExhausted => "transient-exhausted",
            FailureKind::NonRetryable => "non-retryable",
        }
    }
}

/// What happened to a record once the listener was done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The handler applied the record.
    Applied { attempts: u32 },
    /// The record was forwarded to the dead-letter topic.
    DeadLettered { kind: FailureKind, attempts: u32 },
}

/// Drives one partition subscription through a handler.
pub struct Listener<H, P> {
    group: String,
    handler: H,
    dead_letters: P,
    backoff: BackoffConfig,
    idle_interval: Duration,
}

impl<H, P> Listener<H, P>
where
    H: MessageHandler,
    P: Publisher,
{
    /// Creates a listener for a consumer group.
    ///
    /// `dead_letters` is the publisher used to forward records the handler
    /// could not apply.
    pub fn new(group: impl Into<String>, handler: H, dead_letters: P, backoff: BackoffConfig) -> Self {
        Self {
            group: group.into(),
            handler,
            dead_letters,
            backoff,
            idle_interval: Duration::from_millis(100),
        }
    }

    /// Sets how long to wait after an empty poll or a broker error.
    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Applies a record, retrying transient failures until the backoff budget runs out.
    ///
    /// Returns an error only if the record could not be dead-lettered either;
    /// in that case the caller must not commit its offset.
    #[tracing::instrument(
        skip(self, record),
        fields(group = %self.group, topic = %record.topic, partition = record.partition, offset = record.offset)
    )]
    pub async fn process(&self, record: &ConsumerRecord) -> Result<Disposition> {
        metrics::counter!("consumer_messages_total", "topic" => record.topic.clone()).increment(1);
        let mut backoff = ExponentialBackoff::new(&self.backoff);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.handler.handle(record).await {
                Ok(()) => return Ok(Disposition::Applied { attempts }),
                Err(HandlerError::NonRetryable(reason)) => {
                    let kind = FailureKind::NonRetryable;
                    self.dead_letter(record, kind, &reason).await?;
                    return Ok(Disposition::DeadLettered { kind, attempts });
                }
                Err(HandlerError::Transient(reason)) => match backoff.next_delay() {
                    Some(delay) => {
                        metrics::counter!("consumer_retries_total").increment(1);
                        tracing::warn!(
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %reason,
                            "transient failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        let kind = FailureKind::TransientExhausted;
                        self.dead_letter(record, kind, &reason).await?;
                        return Ok(Disposition::DeadLettered { kind, attempts });
                    }
                },
            }
        }
    }

    /// Polls one record, processes it and commits its offset.
    ///
    /// Returns `Ok(None)` if the partition had nothing to deliver. If the record
    /// could not be processed or dead-lettered, the subscription is rewound so
    /// the same record is delivered again.
    pub async fn poll_once<S: Subscription>(&self, subscription: &mut S) -> Result<Option<Disposition>> {
        let Some(record) = subscription.poll().await? else {
            return Ok(None);
        };

        match self.process(&record).await {
            Ok(disposition) => {
                subscription.commit(&record).await?;
                Ok(Some(disposition))
            }
            Err(e) => {
                subscription.seek(record.offset).await?;
                Err(e)
            }
        }
    }

    /// Runs for the lifetime of the process.
    pub async fn run<S: Subscription>(self, mut subscription: S) {
        tracing::info!(
            group = %self.group,
            topic = subscription.topic(),
            partition = subscription.partition(),
            "listener started"
        );

        loop {
            match self.poll_once(&mut subscription).await {
                Ok(Some(_)) => {}
                Ok(None) => tokio::time::sleep(self.idle_interval).await,
                Err(e) => {
                    tracing::warn!(
                        group = %self.group,
                        topic = subscription.topic(),
                        partition = subscription.partition(),
                        error = %e,
                        "listener poll failed"
                    );
                    tokio::time::sleep(self.idle_interval).await;
                }
            }
        }
    }

    async fn dead_letter(&self, record: &ConsumerRecord, kind: FailureKind, reason: &str) -> Result<()> {
        let mut outgoing = OutgoingRecord {
            topic: dead_letter_topic(&record.topic),
            key: record.key.clone(),
            payload: record.payload.clone(),
            headers: record.headers.clone(),
        }
        .with_header(headers::ORIGINAL_TOPIC, record.topic.clone())
        .with_header(headers::ORIGINAL_PARTITION, record.partition.to_string())
        .with_header(headers::ORIGINAL_OFFSET, record.offset.to_string())
        .with_header(headers::EXCEPTION_MESSAGE, reason)
        .with_header(headers::FAILURE_KIND, kind.as_str());
        if let Some(key) = &record.key {
            outgoing = outgoing.with_header(headers::ORIGINAL_KEY, key.clone());
        }

        let receipt = self.dead_letters.publish(outgoing).await?;

        metrics::counter!("consumer_dead_lettered_total", "kind" => kind.as_str()).increment(1);
        tracing::error!(
            group = %self.group,
            source_topic = %record.topic,
            source_partition = record.partition,
            source_offset = record.offset,
            key = record.key.as_deref().unwrap_or(""),
            dead_letter_topic = %receipt.topic,
            failure = kind.as_str(),
            error = %reason,
            "record dead-lettered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{InMemoryBroker, TopicSpec, saga_topics};

    /// Fails with the scripted errors, then succeeds.
    struct ScriptedHandler {
        script: Mutex<Vec<HandlerError>>,
        calls: AtomicU32,
    }

    impl ScriptedHandler {
        fn new(mut script: Vec<HandlerError>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        fn always(error: HandlerError) -> Self {
            Self::new(vec![error; 1000])
        }
    }

    #[async_trait]
    impl MessageHandler for ScriptedHandler {
        async fn handle(&self, _record: &ConsumerRecord) -> std::result::Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn fast_backoff() -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_millis(1),
            multiplier: 2.0,
            max: Duration::from_millis(4),
            max_elapsed: Duration::from_millis(10),
        }
    }

    async fn broker_with_record() -> (InMemoryBroker, ConsumerRecord) {
        let broker = InMemoryBroker::with_topics(
            saga_topics(2)
                .into_iter()
                .chain([TopicSpec::new("t", 2), TopicSpec::new("t.DLT", 2)]),
        );
        let receipt = broker
            .publish(OutgoingRecord::keyed("t", "42", b"payload".to_vec()).with_header("trace", "abc"))
            .await
            .unwrap();
        let record = broker.partition_records("t", receipt.partition).await[0].clone();
        (broker, record)
    }

    #[tokio::test]
    async fn test_applied_first_try() {
        let (broker, record) = broker_with_record().await;
        let listener = Listener::new("g", ScriptedHandler::new(vec![]), broker.clone(), fast_backoff());

        let disposition = listener.process(&record).await.unwrap();
        assert_eq!(disposition, Disposition::Applied { attempts: 1 });
        assert!(broker.records("t.DLT").await.is_empty());
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let (broker, record) = broker_with_record().await;
        let handler = ScriptedHandler::new(vec![
            HandlerError::Transient("db down".into()),
            HandlerError::Transient("db down".into()),
        ]);
        let listener = Listener::new("g", handler, broker.clone(), fast_backoff());

        let disposition = listener.process(&record).await.unwrap();
        assert_eq!(disposition, Disposition::Applied { attempts: 3 });
        assert!(broker.records("t.DLT").await.is_empty());
    }

    #[tokio::test]
    async fn test_non_retryable_skips_backoff() {
        let (broker, record) = broker_with_record().await;
        let handler = ScriptedHandler::always(HandlerError::NonRetryable("bad json".into()));
        let listener = Listener::new("g", handler, broker.clone(), fast_backoff());

        let disposition = listener.process(&record).await.unwrap();
        assert_eq!(
            disposition,
            Disposition::DeadLettered {
                kind: FailureKind::NonRetryable,
                attempts: 1
            }
        );
        assert_eq!(listener.handler().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_initial_backoff_dead_letters_instead_of_spinning() {
        let (broker, record) = broker_with_record().await;
        let handler = ScriptedHandler::always(HandlerError::Transient("db down".into()));
        let backoff = BackoffConfig {
            initial: Duration::ZERO,
            ..fast_backoff()
        };
        let listener = Listener::new("g", handler, broker.clone(), backoff);

        let disposition = listener.process(&record).await.unwrap();
        assert_eq!(
            disposition,
            Disposition::DeadLettered {
                kind: FailureKind::TransientExhausted,
                attempts: 1
            }
        );
        assert_eq!(broker.records("t.DLT").await.len(), 1);
    }

    #[tokio::test]
    async fn test_transient_exhaustion_dead_letters_with_metadata() {
        let (broker, record) = broker_with_record().await;
        let handler = ScriptedHandler::always(HandlerError::Transient("db down".into()));
        let listener = Listener::new("g", handler, broker.clone(), fast_backoff());

        let disposition = listener.process(&record).await.unwrap();
        // delays 1, 2, 4, 3 -> five attempts in total
        assert_eq!(
            disposition,
            Disposition::DeadLettered {
                kind: FailureKind::TransientExhausted,
                attempts: 5
            }
        );

        let dead = broker.records("t.DLT").await;
        assert_eq!(dead.len(), 1);
        let dead = &dead[0];
        assert_eq!(dead.key.as_deref(), Some("42"));
        assert_eq!(dead.payload, b"payload");
        assert_eq!(dead.header("trace"), Some("abc"));
        assert_eq!(dead.header(headers::ORIGINAL_TOPIC), Some("t"));
        assert_eq!(
            dead.header(headers::ORIGINAL_PARTITION),
            Some(record.partition.to_string().as_str())
        );
        assert_eq!(dead.header(headers::ORIGINAL_OFFSET), Some("0"));
        assert_eq!(dead.header(headers::ORIGINAL_KEY), Some("42"));
        assert_eq!(dead.header(headers::FAILURE_KIND), Some("transient-exhausted"));
        assert!(dead.header(headers::EXCEPTION_MESSAGE).unwrap().contains("db down"));
    }

    #[tokio::test]
    async fn test_poll_once_commits_after_processing() {
        let (broker, record) = broker_with_record().await;
        let listener = Listener::new("g", ScriptedHandler::new(vec![]), broker.clone(), fast_backoff());
        let mut sub = broker.subscribe("g", "t", record.partition);

        let disposition = listener.poll_once(&mut sub).await.unwrap();
        assert_eq!(disposition, Some(Disposition::Applied { attempts: 1 }));
        assert_eq!(broker.committed_offset("g", "t", record.partition).await, Some(1));
        assert_eq!(listener.poll_once(&mut sub).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dead_letter_failure_leaves_offset_uncommitted() {
        let (broker, record) = broker_with_record().await;
        let handler = ScriptedHandler::new(vec![HandlerError::NonRetryable("bad".into())]);
        let listener = Listener::new("g", handler, broker.clone(), fast_backoff());
        let mut sub = broker.subscribe("g", "t", record.partition);

        // Poll succeeds, then the dead-letter publish times out.
        broker.fail_next_publishes(1).await;
        assert!(listener.poll_once(&mut sub).await.is_err());
        assert_eq!(broker.committed_offset("g", "t", record.partition).await, None);

        // The record is handed out again and, now that the script is spent, applied.
        let disposition = listener.poll_once(&mut sub).await.unwrap();
        assert_eq!(disposition, Some(Disposition::Applied { attempts: 1 }));
        assert_eq!(broker.committed_offset("g", "t", record.partition).await, Some(1));
    }
}
