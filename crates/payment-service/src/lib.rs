//! Payment ledger side of the saga.
//!
//! [`OrderCreatedHandler`] settles each order exactly once: it asks a
//! [`PaymentDecider`] for the outcome, then records the [`Settlement`] and
//! stages the `PaymentSettled` answer in one local transaction. The unique
//! order ID on settlements turns every redelivery into a no-op.

pub mod consumer;
pub mod decider;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod settlement;
pub mod store;

pub use consumer::OrderCreatedHandler;
pub use decider::{AmountLimitDecider, InMemoryPaymentDecider, PaymentDecider};
pub use error::{PaymentError, Result};
pub use memory::{InMemorySettlementStore, SettlementTable};
pub use postgres::PostgresSettlementStore;
pub use settlement::Settlement;
pub use store::SettlementStore;
