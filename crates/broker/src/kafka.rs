//! Kafka-compatible adapter built on rdkafka.
//!
//! The producer is idempotent and waits for acknowledgement from all in-sync
//! replicas, so a successful [`Publisher::publish`] means the record is
//! durably replicated. Consumers never auto-commit: offsets are committed by
//! the [`crate::Listener`] only after a record has been processed.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Header, Headers as _, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};

use crate::{
    BrokerError, ConsumerRecord, DeliveryReceipt, Headers, OutgoingRecord, Publisher, Result,
    Subscription, partition_for,
};

fn client_error(e: KafkaError) -> BrokerError {
    BrokerError::Client(e.to_string())
}

/// Idempotent, `acks=all` producer.
///
/// Keyed records are sent to an explicit partition chosen by
/// [`partition_for`], the same assignment the in-memory broker uses, so a
/// correlation key lands on the same partition number in every topic of
/// `partitions` partitions. Keyless records are left to the client's
/// partitioner.
pub struct KafkaPublisher {
    producer: FutureProducer,
    partitions: i32,
    timeout: Duration,
}

impl KafkaPublisher {
    /// Creates a producer for the given bootstrap servers.
    ///
    /// `timeout` bounds each publish call, including time spent waiting for
    /// replica acknowledgement.
    pub fn new(brokers: &str, partitions: i32, timeout: Duration) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .create()
            .map_err(client_error)?;

        tracing::info!(
            brokers = %brokers,
            partitions,
            acks = "all",
            idempotent = true,
            "kafka producer created"
        );

        Ok(Self {
            producer,
            partitions,
            timeout,
        })
    }
}

fn future_record(record: &OutgoingRecord, partitions: i32) -> FutureRecord<'_, str, [u8]> {
    let mut headers = OwnedHeaders::new();
    for (name, value) in &record.headers {
        headers = headers.insert(Header {
            key: name.as_str(),
            value: Some(value.as_bytes()),
        });
    }

    let mut future_record = FutureRecord::<str, [u8]>::to(&record.topic)
        .payload(record.payload.as_slice())
        .headers(headers);
    if let Some(key) = record.key.as_deref() {
        future_record = future_record
            .key(key)
            .partition(partition_for(Some(key), partitions));
    }
    future_record
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, record: OutgoingRecord) -> Result<DeliveryReceipt> {
        match self
            .producer
            .send(
                future_record(&record, self.partitions),
                Timeout::After(self.timeout),
            )
            .await
        {
            Ok((partition, offset)) => Ok(DeliveryReceipt {
                topic: record.topic.clone(),
                partition,
                offset,
            }),
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut), _)) => {
                Err(BrokerError::Timeout(format!(
                    "no acknowledgement for record on {}",
                    record.topic
                )))
            }
            Err((e, _)) => Err(BrokerError::Unavailable(e.to_string())),
        }
    }
}

/// A consumer-group member manually assigned to one partition.
pub struct KafkaSubscription {
    consumer: StreamConsumer,
    topic: String,
    partition: i32,
    poll_timeout: Duration,
}

impl KafkaSubscription {
    /// Creates a consumer in `group` assigned to `topic`/`partition`.
    ///
    /// Reading resumes at the group's committed offset, or at the earliest
    /// offset for a new group.
    pub fn assign(brokers: &str, group: &str, topic: &str, partition: i32) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(client_error)?;

        let mut assignment = TopicPartitionList::new();
        assignment.add_partition(topic, partition);
        consumer.assign(&assignment).map_err(client_error)?;

        tracing::info!(group = %group, topic = %topic, partition, "kafka consumer assigned");

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            partition,
            poll_timeout: Duration::from_millis(500),
        })
    }

    fn to_record(message: &BorrowedMessage<'_>) -> ConsumerRecord {
        let mut headers = Headers::new();
        if let Some(borrowed) = message.headers() {
            for header in borrowed.iter() {
                if let Some(value) = header.value {
                    headers.insert(
                        header.key.to_string(),
                        String::from_utf8_lossy(value).into_owned(),
                    );
                }
            }
        }

        ConsumerRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            headers,
        }
    }
}

#[async_trait]
impl Subscription for KafkaSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition(&self) -> i32 {
        self.partition
    }

    async fn poll(&mut self) -> Result<Option<ConsumerRecord>> {
        match tokio::time::timeout(self.poll_timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(client_error(e)),
            Ok(Ok(message)) => Ok(Some(Self::to_record(&message))),
        }
    }

    async fn commit(&mut self, record: &ConsumerRecord) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(client_error)?;
        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(client_error)
    }

    async fn seek(&mut self, offset: i64) -> Result<()> {
        self.consumer
            .seek(
                &self.topic,
                self.partition,
                Offset::Offset(offset),
                Timeout::After(Duration::from_secs(5)),
            )
            .map_err(client_error)
    }
}
