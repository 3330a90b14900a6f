use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    BrokerError, ConsumerRecord, DeliveryReceipt, OutgoingRecord, Publisher, Result, Subscription,
    TopicSpec, partition_for,
};

#[derive(Debug, Default)]
struct BrokerState {
    /// topic -> partitions -> records in append order
    topics: HashMap<String, Vec<Vec<ConsumerRecord>>>,
    /// (group, topic, partition) -> next offset to read
    committed: HashMap<(String, String, i32), i64>,
    unavailable: bool,
    failures_remaining: u32,
}

/// In-memory partitioned log for testing and single-process runs.
///
/// Offers the same delivery semantics as the Kafka adapter: per-key
/// partition affinity, append order within a partition, and per-group
/// committed offsets that survive a subscriber being dropped and recreated.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<RwLock<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a broker with no topics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker with the given topics already declared.
    pub fn with_topics(topics: impl IntoIterator<Item = TopicSpec>) -> Self {
        let state = BrokerState {
            topics: topics
                .into_iter()
                .map(|spec| {
                    let partitions = spec.partitions.max(1) as usize;
                    (spec.name, vec![Vec::new(); partitions])
                })
                .collect(),
            ..BrokerState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Declares a topic. Declaring an existing topic is a no-op.
    pub async fn create_topic(&self, spec: TopicSpec) {
        let mut state = self.state.write().await;
        let partitions = spec.partitions.max(1) as usize;
        state
            .topics
            .entry(spec.name)
            .or_insert_with(|| vec![Vec::new(); partitions]);
    }

    /// Simulates the broker going down or coming back.
    pub async fn set_available(&self, available: bool) {
        self.state.write().await.unavailable = !available;
    }

    /// Makes the next `count` publishes fail as if the broker timed out.
    pub async fn fail_next_publishes(&self, count: u32) {
        self.state.write().await.failures_remaining = count;
    }

    /// Returns the partition count of a topic.
    pub async fn partitions(&self, topic: &str) -> Option<i32> {
        let state = self.state.read().await;
        state.topics.get(topic).map(|p| p.len() as i32)
    }

    /// Returns every record of a topic, partition by partition.
    pub async fn records(&self, topic: &str) -> Vec<ConsumerRecord> {
        let state = self.state.read().await;
        state
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the records of one partition in append order.
    pub async fn partition_records(&self, topic: &str, partition: i32) -> Vec<ConsumerRecord> {
        let state = self.state.read().await;
        state
            .topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the next offset `group` will read on a partition, if it committed any.
    pub async fn committed_offset(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        let state = self.state.read().await;
        state
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }

    /// Creates a group member reading one partition, starting at the group's committed offset.
    pub fn subscribe(
        &self,
        group: impl Into<String>,
        topic: impl Into<String>,
        partition: i32,
    ) -> InMemorySubscription {
        InMemorySubscription {
            broker: self.clone(),
            group: group.into(),
            topic: topic.into(),
            partition,
            position: None,
        }
    }
}

#[async_trait]
impl Publisher for InMemoryBroker {
    async fn publish(&self, record: OutgoingRecord) -> Result<DeliveryReceipt> {
        let mut state = self.state.write().await;

        if state.unavailable {
            return Err(BrokerError::Unavailable(
                "in-memory broker is down".to_string(),
            ));
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(BrokerError::Timeout(format!(
                "no acknowledgement for record on {}",
                record.topic
            )));
        }

        let partitions = state
            .topics
            .get_mut(&record.topic)
            .ok_or_else(|| BrokerError::UnknownTopic(record.topic.clone()))?;
        let partition = partition_for(record.key.as_deref(), partitions.len() as i32);
        let log = &mut partitions[partition as usize];
        let offset = log.len() as i64;

        log.push(ConsumerRecord {
            topic: record.topic.clone(),
            partition,
            offset,
            key: record.key,
            payload: record.payload,
            headers: record.headers,
        });

        Ok(DeliveryReceipt {
            topic: record.topic,
            partition,
            offset,
        })
    }
}

/// A subscription to one partition of an [`InMemoryBroker`] topic.
#[derive(Debug)]
pub struct InMemorySubscription {
    broker: InMemoryBroker,
    group: String,
    topic: String,
    partition: i32,
    /// Next offset to hand out; resolved from the committed offset on first poll.
    position: Option<i64>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition(&self) -> i32 {
        self.partition
    }

    async fn poll(&mut self) -> Result<Option<ConsumerRecord>> {
        let state = self.broker.state.read().await;
        if state.unavailable {
            return Err(BrokerError::Unavailable(
                "in-memory broker is down".to_string(),
            ));
        }

        let log = state
            .topics
            .get(&self.topic)
            .ok_or_else(|| BrokerError::UnknownTopic(self.topic.clone()))?
            .get(self.partition as usize)
            .ok_or_else(|| BrokerError::UnknownPartition {
                topic: self.topic.clone(),
                partition: self.partition,
            })?;

        let key = (self.group.clone(), self.topic.clone(), self.partition);
        let position = self
            .position
            .unwrap_or_else(|| state.committed.get(&key).copied().unwrap_or(0));

        match log.get(position as usize) {
            Some(record) => {
                self.position = Some(position + 1);
                Ok(Some(record.clone()))
            }
            None => {
                self.position = Some(position);
                Ok(None)
            }
        }
    }

    async fn commit(&mut self, record: &ConsumerRecord) -> Result<()> {
        let mut state = self.broker.state.write().await;
        let key = (self.group.clone(), record.topic.clone(), record.partition);
        let next = record.offset + 1;
        let committed = state.committed.entry(key).or_insert(0);
        if next > *committed {
            *committed = next;
        }
        Ok(())
    }

    async fn seek(&mut self, offset: i64) -> Result<()> {
        self.position = Some(offset);
        Ok(())
    }
}
