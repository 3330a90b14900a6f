//! Applies `PaymentSettled` events from the payment ledger.

use async_trait::async_trait;
use broker::{ConsumerRecord, HandlerError, MessageHandler};
use common::{ContractError, PaymentSettled};

use crate::{OrderError, OrderStore, Transition};

/// Consumer for the `payment-settled` topic.
///
/// Two guards make redelivery harmless: an order that is already resolved is
/// skipped before any write, and the store re-checks the status under its
/// row lock so two racing deliveries still transition the order once.
pub struct PaymentSettledHandler<S> {
    store: S,
}

impl<S: OrderStore> PaymentSettledHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn decode(record: &ConsumerRecord) -> Result<PaymentSettled, OrderError> {
        let event = PaymentSettled::from_slice(&record.payload)?;
        let expected_key = event.order_id.correlation_key();
        if record.key.as_deref() != Some(expected_key.as_str()) {
            return Err(ContractError::Invalid(format!(
                "record key {:?} does not match order {}",
                record.key, event.order_id
            ))
            .into());
        }
        Ok(event)
    }

    async fn apply(&self, event: &PaymentSettled) -> Result<(), OrderError> {
        let order = self
            .store
            .get(event.order_id)
            .await?
            .ok_or(OrderError::NotFound(event.order_id))?;

        if !order.status.can_settle() {
            metrics::counter!("consumer_duplicates_total", "topic" => "payment-settled")
                .increment(1);
            tracing::info!(
                order_id = %event.order_id,
                payment_id = %event.payment_id,
                status = %order.status,
                "order already settled, skipping"
            );
            return Ok(());
        }

        match self.store.apply_settlement(event.order_id, event.status).await? {
            Transition::Applied { from, to } => {
                metrics::counter!("saga_transitions_total", "to" => to.as_str()).increment(1);
                tracing::info!(
                    order_id = %event.order_id,
                    payment_id = %event.payment_id,
                    %from,
                    %to,
                    "order settled"
                );
            }
            Transition::Skipped { current } => {
                metrics::counter!("consumer_duplicates_total", "topic" => "payment-settled")
                    .increment(1);
                tracing::info!(
                    order_id = %event.order_id,
                    payment_id = %event.payment_id,
                    status = %current,
                    "order settled concurrently, skipping"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S: OrderStore> MessageHandler for PaymentSettledHandler<S> {
    async fn handle(&self, record: &ConsumerRecord) -> Result<(), HandlerError> {
        let event = Self::decode(record).map_err(|e| e.classify())?;
        self.apply(&event).await.map_err(|e| e.classify())
    }
}
