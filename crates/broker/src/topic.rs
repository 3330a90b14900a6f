//! Topic names, dead-letter naming and partition assignment.

use common::{ORDER_CREATED_TOPIC, PAYMENT_SETTLED_TOPIC};

/// Suffix appended to a source topic to name its dead-letter topic.
pub const DEAD_LETTER_SUFFIX: &str = ".DLT";

/// Header names attached to dead-lettered records.
pub mod headers {
    pub const ORIGINAL_TOPIC: &str = "dlt-original-topic";
    pub const ORIGINAL_PARTITION: &str = "dlt-original-partition";
    pub const ORIGINAL_OFFSET: &str = "dlt-original-offset";
    pub const ORIGINAL_KEY: &str = "dlt-original-key";
    pub const EXCEPTION_MESSAGE: &str = "dlt-exception-message";
    pub const FAILURE_KIND: &str = "dlt-failure-kind";
}

/// Returns the dead-letter topic mirroring `topic`.
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}{DEAD_LETTER_SUFFIX}")
}

/// Declaration of one topic of the saga.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
        }
    }

    /// Returns the dead-letter companion of this topic, with the same partition count.
    pub fn dead_letter(&self) -> TopicSpec {
        TopicSpec::new(dead_letter_topic(&self.name), self.partitions)
    }
}

/// All topics the saga needs: both directions plus their dead-letter topics.
pub fn saga_topics(partitions: i32) -> Vec<TopicSpec> {
    [ORDER_CREATED_TOPIC, PAYMENT_SETTLED_TOPIC]
        .into_iter()
        .flat_map(|name| {
            let spec = TopicSpec::new(name, partitions);
            let dlt = spec.dead_letter();
            [spec, dlt]
        })
        .collect()
}

/// Picks the partition for a record key.
///
/// Uses 32-bit FNV-1a so the assignment is stable across processes and builds.
/// Records without a key go to partition 0.
pub fn partition_for(key: Option<&str>, partitions: i32) -> i32 {
    let Some(key) = key else {
        return 0;
    };
    if partitions <= 1 {
        return 0;
    }

    let mut hash: u32 = 0x811c_9dc5;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    (hash % partitions as u32) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_naming() {
        assert_eq!(dead_letter_topic("order-created"), "order-created.DLT");
    }

    #[test]
    fn test_saga_topics_include_dead_letters() {
        let names: Vec<String> = saga_topics(3).into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "order-created",
                "order-created.DLT",
                "payment-settled",
                "payment-settled.DLT"
            ]
        );
    }

    #[test]
    fn test_partition_is_stable_for_key() {
        let first = partition_for(Some("42"), 8);
        for _ in 0..10 {
            assert_eq!(partition_for(Some("42"), 8), first);
        }
        assert!((0..8).contains(&first));
    }

    #[test]
    fn test_partition_without_key_or_single_partition() {
        assert_eq!(partition_for(None, 8), 0);
        assert_eq!(partition_for(Some("42"), 1), 0);
    }

    #[test]
    fn test_keys_spread_over_partitions() {
        let used: std::collections::HashSet<i32> = (0..100)
            .map(|i| partition_for(Some(&i.to_string()), 4))
            .collect();
        assert!(used.len() > 1);
    }
}
