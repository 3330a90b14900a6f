use broker::HandlerError;
use common::{ContractError, Money, OrderId};
use outbox::OutboxError;
use thiserror::Error;

/// Errors that can occur in the order ledger.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Orders must be for a positive amount.
    #[error("Invalid order amount: {0}")]
    InvalidAmount(Money),

    /// No order with this ID exists.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// An incoming event could not be decoded.
    #[error("Invalid event: {0}")]
    Contract(#[from] ContractError),

    /// A stored status value is not recognised.
    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    /// The store cannot be reached.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),

    /// Staging the outbox event failed.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl OrderError {
    /// Classifies the error for the consumer retry policy.
    pub fn classify(&self) -> HandlerError {
        let message = self.to_string();
        match self {
            OrderError::Unavailable(_)
            | OrderError::Database(_)
            | OrderError::Outbox(OutboxError::Database(_)) => HandlerError::Transient(message),
            OrderError::InvalidAmount(_)
            | OrderError::NotFound(_)
            | OrderError::Contract(_)
            | OrderError::InvalidStatus(_)
            | OrderError::Outbox(_) => HandlerError::NonRetryable(message),
        }
    }
}

/// Result type for order ledger operations.
pub type Result<T> = std::result::Result<T, OrderError>;
