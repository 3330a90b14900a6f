//! Transactional outbox for the order/payment saga.
//!
//! A business mutation and the event describing it are written in one local
//! transaction: the event lands in the outbox as a PENDING [`StagedEvent`].
//! The [`RelayScheduler`] later drains pending rows to the broker, marking
//! each SENT on acknowledgement, or FAILED once it has failed
//! `max_retry_count` publish attempts. A crash between commit and publish
//! loses nothing; the row is still PENDING when the process comes back.

pub mod appender;
pub mod contract;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod relay;
pub mod staged;
pub mod store;

pub use appender::{OutboxAppender, OutboxEvent, StagingTransaction, stage};
pub use error::{OutboxError, Result};
pub use memory::{InMemoryLedger, LedgerState, LedgerTransaction, OutboxTable};
pub use postgres::PostgresOutboxStore;
pub use relay::{RelayScheduler, TickReport};
pub use staged::{NewStagedEvent, OutboxStatus, StagedEvent, StagedEventId};
pub use store::OutboxStore;
