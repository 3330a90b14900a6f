//! Broker topic contract and delivery plumbing for the order/payment saga.
//!
//! The broker is a partitioned, append-only log. Records are keyed by the
//! correlation key of the business entity they describe, so every record for
//! one entity lands on the same partition and is consumed in append order.
//!
//! Delivery is at-least-once: a [`Listener`] commits a record's offset only
//! after its handler has applied it (or after the record has been forwarded
//! to the dead-letter topic), so a crash mid-processing causes redelivery.
//!
//! Two implementations of the [`Publisher`] and [`Subscription`] seams exist:
//! [`InMemoryBroker`] for tests and single-process runs, and a Kafka adapter
//! behind the `kafka` feature.

pub mod backoff;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod listener;
pub mod memory;
pub mod publisher;
pub mod record;
pub mod topic;

pub use backoff::ExponentialBackoff;
pub use error::{BrokerError, Result};
pub use listener::{Disposition, FailureKind, HandlerError, Listener, MessageHandler};
pub use memory::{InMemoryBroker, InMemorySubscription};
pub use publisher::{Publisher, Subscription};
pub use record::{ConsumerRecord, DeliveryReceipt, Headers, OutgoingRecord};
pub use topic::{TopicSpec, dead_letter_topic, partition_for, saga_topics};
