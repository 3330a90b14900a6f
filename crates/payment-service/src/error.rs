use broker::HandlerError;
use common::{ContractError, OrderId};
use outbox::OutboxError;
use thiserror::Error;

/// Errors that can occur in the payment ledger.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// A settlement for this order already exists.
    #[error("Order {0} is already settled")]
    AlreadySettled(OrderId),

    /// The payment-decision provider could not be reached.
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// An incoming event could not be decoded.
    #[error("Invalid event: {0}")]
    Contract(#[from] ContractError),

    /// A stored status value is not recognised.
    #[error("Invalid payment status: {0}")]
    InvalidStatus(String),

    /// The store cannot be reached.
    #[error("Settlement store unavailable: {0}")]
    Unavailable(String),

    /// Staging the outbox event failed.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PaymentError {
    /// Classifies the error for the consumer retry policy.
    ///
    /// `AlreadySettled` never reaches the listener; the consumer absorbs it
    /// as a duplicate.
    pub fn classify(&self) -> HandlerError {
        let message = self.to_string();
        match self {
            PaymentError::ProviderUnavailable(_)
            | PaymentError::Unavailable(_)
            | PaymentError::Database(_)
            | PaymentError::Outbox(OutboxError::Database(_)) => HandlerError::Transient(message),
            PaymentError::AlreadySettled(_)
            | PaymentError::Contract(_)
            | PaymentError::InvalidStatus(_)
            | PaymentError::Outbox(_) => HandlerError::NonRetryable(message),
        }
    }
}

/// Result type for payment ledger operations.
pub type Result<T> = std::result::Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_outage_is_transient() {
        let error = PaymentError::ProviderUnavailable("timeout".to_string());
        assert!(matches!(error.classify(), HandlerError::Transient(_)));
    }

    #[test]
    fn bad_payload_is_not_retryable() {
        let error = PaymentError::Contract(ContractError::Invalid("amount must be positive".to_string()));
        assert!(matches!(error.classify(), HandlerError::NonRetryable(_)));
    }
}
