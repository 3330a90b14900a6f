//! Order ledger side of the saga.
//!
//! Placing an order writes the order in status `NEW` and stages an
//! `OrderCreated` event in the same local transaction. The payment ledger
//! answers with `PaymentSettled`, which [`PaymentSettledHandler`] applies:
//! the order moves to `PREPARED` or `CANCELED` exactly once, however many
//! times the settlement is delivered.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod service;
pub mod state;
pub mod store;

pub use consumer::PaymentSettledHandler;
pub use error::{OrderError, Result};
pub use memory::{InMemoryOrderStore, OrderTable};
pub use order::{Order, Transition};
pub use postgres::PostgresOrderStore;
pub use service::OrderService;
pub use state::OrderStatus;
pub use store::OrderStore;
