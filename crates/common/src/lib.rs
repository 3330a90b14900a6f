//! Shared types for the order/payment saga.
//!
//! Both services depend on this crate for the identifiers they exchange,
//! the event bodies carried over the broker, and the tunables of the
//! relay and consumer loops.

pub mod config;
pub mod contract;
pub mod types;

pub use config::{BackoffConfig, ConfigError, RelayConfig, SagaConfig};
pub use contract::{
    ContractError, ORDER_CREATED_TOPIC, OrderCreated, PAYMENT_SETTLED_TOPIC, PaymentSettled,
    PaymentStatus,
};
pub use types::{Money, OrderId};
