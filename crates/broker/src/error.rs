use thiserror::Error;

/// Errors that can occur when talking to the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The broker did not acknowledge in time.
    #[error("Broker timeout: {0}")]
    Timeout(String),

    /// The topic does not exist.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// The partition does not exist on the topic.
    #[error("Unknown partition {partition} on topic {topic}")]
    UnknownPartition { topic: String, partition: i32 },

    /// An error reported by the underlying client library.
    #[error("Broker client error: {0}")]
    Client(String),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
