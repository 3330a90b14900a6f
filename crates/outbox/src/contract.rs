//! Outbox routing for the saga's event bodies.

use common::{ORDER_CREATED_TOPIC, OrderCreated, PAYMENT_SETTLED_TOPIC, PaymentSettled};

use crate::OutboxEvent;

impl OutboxEvent for OrderCreated {
    fn event_type(&self) -> &'static str {
        OrderCreated::EVENT_TYPE
    }

    fn topic(&self) -> &'static str {
        ORDER_CREATED_TOPIC
    }

    fn correlation_key(&self) -> String {
        self.order_id.correlation_key()
    }
}

impl OutboxEvent for PaymentSettled {
    fn event_type(&self) -> &'static str {
        PaymentSettled::EVENT_TYPE
    }

    fn topic(&self) -> &'static str {
        PAYMENT_SETTLED_TOPIC
    }

    fn correlation_key(&self) -> String {
        self.order_id.correlation_key()
    }
}
