//! Settles orders announced by `OrderCreated` events.

use async_trait::async_trait;
use broker::{ConsumerRecord, HandlerError, MessageHandler};
use common::{ContractError, OrderCreated};

use crate::{PaymentDecider, PaymentError, SettlementStore};

/// Consumer for the `order-created` topic.
pub struct OrderCreatedHandler<S, D> {
    store: S,
    decider: D,
}

impl<S: SettlementStore, D: PaymentDecider> OrderCreatedHandler<S, D> {
    pub fn new(store: S, decider: D) -> Self {
        Self { store, decider }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn decode(record: &ConsumerRecord) -> Result<OrderCreated, PaymentError> {
        let event = OrderCreated::from_slice(&record.payload)?;
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

    fn skip_duplicate(event: &OrderCreated, reason: &'static str) {
        metrics::counter!("consumer_duplicates_total", "topic" => "order-created").increment(1);
        tracing::info!(order_id = %event.order_id, reason, "order already settled, skipping");
    }

    async fn apply(&self, event: &OrderCreated) -> Result<(), PaymentError> {
        if self.store.find_by_order(event.order_id).await?.is_some() {
            Self::skip_duplicate(event, "settlement exists");
            return Ok(());
        }

        let outcome = self.decider.decide(event.order_id, event.amount).await?;

        match self
            .store
            .record_settlement(event.order_id, event.amount, outcome)
            .await
        {
            Ok(settlement) => {
                metrics::counter!("payments_settled_total", "status" => outcome.as_str())
                    .increment(1);
                tracing::info!(
                    order_id = %event.order_id,
                    payment_id = %settlement.id,
                    amount = %event.amount,
                    status = %outcome,
                    "payment settled"
                );
                Ok(())
            }
            Err(PaymentError::AlreadySettled(_)) => {
                Self::skip_duplicate(event, "settled concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<S: SettlementStore, D: PaymentDecider> MessageHandler for OrderCreatedHandler<S, D> {
    async fn handle(&self, record: &ConsumerRecord) -> Result<(), HandlerError> {
        let event = Self::decode(record).map_err(|e| e.classify())?;
        self.apply(&event).await.map_err(|e| e.classify())
    }
}
