//! Wiring of both ledgers to the broker.
//!
//! Each ledger gets one relay draining its outbox. Each topic partition gets
//! one listener per consuming group, so records for one order are applied in
//! order while different partitions proceed independently.

use std::sync::Arc;

use broker::{InMemoryBroker, Listener, Publisher, Subscription, saga_topics};
use common::{BackoffConfig, ORDER_CREATED_TOPIC, PAYMENT_SETTLED_TOPIC, RelayConfig, SagaConfig};
use order_service::{InMemoryOrderStore, OrderStore, PaymentSettledHandler};
use outbox::{OutboxStore, RelayScheduler};
use payment_service::{
    InMemoryPaymentDecider, InMemorySettlementStore, OrderCreatedHandler, PaymentDecider,
    SettlementStore,
};
use tokio::task::JoinHandle;

/// Consumer group of the payment ledger, reading `order-created`.
pub const PAYMENT_GROUP: &str = "payment-service";

/// Consumer group of the order ledger, reading `payment-settled`.
pub const ORDER_GROUP: &str = "order-service";

/// Opens a group member on one partition: `(group, topic, partition)`.
pub type SubscriptionFactory =
    Arc<dyn Fn(&str, &str, i32) -> broker::Result<Box<dyn Subscription>> + Send + Sync>;

pub type Relay = RelayScheduler<Arc<dyn OutboxStore>, Arc<dyn Publisher>>;

pub type PaymentListener = Listener<
    OrderCreatedHandler<Arc<dyn SettlementStore>, Arc<dyn PaymentDecider>>,
    Arc<dyn Publisher>,
>;

pub type OrderListener = Listener<PaymentSettledHandler<Arc<dyn OrderStore>>, Arc<dyn Publisher>>;

/// Everything the saga needs, independent of storage and broker backends.
#[derive(Clone)]
pub struct SagaComponents {
    pub orders: Arc<dyn OrderStore>,
    pub order_outbox: Arc<dyn OutboxStore>,
    pub settlements: Arc<dyn SettlementStore>,
    pub payment_outbox: Arc<dyn OutboxStore>,
    pub decider: Arc<dyn PaymentDecider>,
    pub publisher: Arc<dyn Publisher>,
    pub subscriptions: SubscriptionFactory,
    pub partitions: i32,
}

impl SagaComponents {
    /// Relay draining the order ledger's outbox.
    pub fn order_relay(&self, config: &RelayConfig) -> Relay {
        RelayScheduler::new(
            "orders",
            Arc::clone(&self.order_outbox),
            Arc::clone(&self.publisher),
            config.clone(),
        )
    }

    /// Relay draining the payment ledger's outbox.
    pub fn payment_relay(&self, config: &RelayConfig) -> Relay {
        RelayScheduler::new(
            "payments",
            Arc::clone(&self.payment_outbox),
            Arc::clone(&self.publisher),
            config.clone(),
        )
    }

    /// Listener settling orders from `order-created`.
    pub fn payment_listener(&self, backoff: &BackoffConfig) -> PaymentListener {
        let handler =
            OrderCreatedHandler::new(Arc::clone(&self.settlements), Arc::clone(&self.decider));
        Listener::new(
            PAYMENT_GROUP,
            handler,
            Arc::clone(&self.publisher),
            backoff.clone(),
        )
    }

    /// Listener applying settlements from `payment-settled`.
    pub fn order_listener(&self, backoff: &BackoffConfig) -> OrderListener {
        let handler = PaymentSettledHandler::new(Arc::clone(&self.orders));
        Listener::new(
            ORDER_GROUP,
            handler,
            Arc::clone(&self.publisher),
            backoff.clone(),
        )
    }

    /// Opens a subscription for one group on one partition.
    pub fn subscribe(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> broker::Result<Box<dyn Subscription>> {
        (self.subscriptions)(group, topic, partition)
    }
}

/// Starts both relays and one listener per partition and group.
///
/// The tasks run until aborted. Fails without starting anything if a
/// subscription cannot be opened.
pub fn spawn(
    components: &SagaComponents,
    config: &SagaConfig,
) -> broker::Result<Vec<JoinHandle<()>>> {
    let mut settling = Vec::new();
    let mut applying = Vec::new();
    for partition in 0..components.partitions {
        settling.push(components.subscribe(PAYMENT_GROUP, ORDER_CREATED_TOPIC, partition)?);
        applying.push(components.subscribe(ORDER_GROUP, PAYMENT_SETTLED_TOPIC, partition)?);
    }

    let mut tasks = vec![
        tokio::spawn(components.order_relay(&config.relay).run()),
        tokio::spawn(components.payment_relay(&config.relay).run()),
    ];
    for subscription in settling {
        let listener = components.payment_listener(&config.backoff);
        tasks.push(tokio::spawn(listener.run(subscription)));
    }
    for subscription in applying {
        let listener = components.order_listener(&config.backoff);
        tasks.push(tokio::spawn(listener.run(subscription)));
    }

    tracing::info!(
        partitions = components.partitions,
        tasks = tasks.len(),
        "saga started"
    );
    Ok(tasks)
}

/// Both ledgers and the broker, all in memory.
///
/// Used by tests and when no database or broker is configured.
#[derive(Clone)]
pub struct InMemorySaga {
    pub broker: InMemoryBroker,
    pub orders: InMemoryOrderStore,
    pub settlements: InMemorySettlementStore,
    pub decider: InMemoryPaymentDecider,
    pub partitions: i32,
}

impl InMemorySaga {
    pub fn new(partitions: i32) -> Self {
        Self::with_orders(InMemoryOrderStore::new(), partitions)
    }

    /// Uses the given order store, e.g. one starting at a specific order ID.
    pub fn with_orders(orders: InMemoryOrderStore, partitions: i32) -> Self {
        Self {
            broker: InMemoryBroker::with_topics(saga_topics(partitions)),
            orders,
            settlements: InMemorySettlementStore::new(),
            decider: InMemoryPaymentDecider::new(),
            partitions,
        }
    }

    pub fn components(&self) -> SagaComponents {
        let log = self.broker.clone();
        SagaComponents {
            orders: Arc::new(self.orders.clone()),
            order_outbox: Arc::new(self.orders.outbox()),
            settlements: Arc::new(self.settlements.clone()),
            payment_outbox: Arc::new(self.settlements.outbox()),
            decider: Arc::new(self.decider.clone()),
            publisher: Arc::new(self.broker.clone()),
            subscriptions: Arc::new(
                move |group: &str, topic: &str, partition: i32| -> broker::Result<Box<dyn Subscription>> {
                    Ok(Box::new(log.subscribe(group, topic, partition)))
                },
            ),
            partitions: self.partitions,
        }
    }
}
