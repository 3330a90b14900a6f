//! Saga runtime entry point.

use std::sync::Arc;

use broker::Publisher;
use futures_util::future::join_all;
use order_service::PostgresOrderStore;
use payment_service::{AmountLimitDecider, PostgresSettlementStore};
use saga_runtime::saga::SubscriptionFactory;
use saga_runtime::{AppState, Config, InMemorySaga, SagaComponents};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn connect(url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(10).connect(url).await
}

#[cfg(feature = "kafka")]
fn kafka_broker(
    brokers: &str,
    partitions: i32,
) -> broker::Result<(Arc<dyn Publisher>, SubscriptionFactory)> {
    use broker::Subscription;
    use broker::kafka::{KafkaPublisher, KafkaSubscription};

    let publisher =
        KafkaPublisher::new(brokers, partitions, std::time::Duration::from_secs(30))?;
    let brokers = brokers.to_string();
    let subscriptions: SubscriptionFactory = Arc::new(
        move |group: &str, topic: &str, partition: i32| -> broker::Result<Box<dyn Subscription>> {
            Ok(Box::new(KafkaSubscription::assign(
                &brokers, group, topic, partition,
            )?))
        },
    );
    Ok((Arc::new(publisher), subscriptions))
}

#[cfg(not(feature = "kafka"))]
fn kafka_broker(
    _brokers: &str,
    _partitions: i32,
) -> broker::Result<(Arc<dyn Publisher>, SubscriptionFactory)> {
    Err(broker::BrokerError::Client(
        "KAFKA_BROKERS is set but this build lacks the `kafka` feature".to_string(),
    ))
}

/// Picks storage and broker backends from the configuration.
///
/// Anything not configured runs in memory.
async fn build_components(config: &Config) -> Result<SagaComponents, Box<dyn std::error::Error>> {
    let memory = InMemorySaga::new(config.partitions);
    let mut components = memory.components();
    components.decider = Arc::new(AmountLimitDecider::default());

    if let Some((order_url, payment_url)) = config.database_urls() {
        let orders = PostgresOrderStore::new(connect(order_url).await?);
        orders.install_schema().await?;
        let settlements = PostgresSettlementStore::new(connect(payment_url).await?);
        settlements.install_schema().await?;

        components.order_outbox = Arc::new(orders.outbox());
        components.orders = Arc::new(orders);
        components.payment_outbox = Arc::new(settlements.outbox());
        components.settlements = Arc::new(settlements);
        tracing::info!("ledgers backed by PostgreSQL");
    } else {
        tracing::info!("ledgers running in memory");
    }

    if let Some(brokers) = &config.kafka_brokers {
        let (publisher, subscriptions) = kafka_broker(brokers, config.partitions)?;
        components.publisher = publisher;
        components.subscriptions = subscriptions;
        tracing::info!(%brokers, "using Kafka broker");
    } else {
        tracing::info!(partitions = config.partitions, "using in-memory broker");
    }

    Ok(components)
}

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire ledgers and broker, then start relays and listeners
    let components = build_components(&config)
        .await
        .expect("failed to initialize saga components");
    let tasks = saga_runtime::saga::spawn(&components, &config.saga).expect("failed to start saga");

    // 4. Build the admin application
    let app = saga_runtime::create_app(AppState::new(&components), metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting admin server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 6. Stop relays and listeners; uncommitted work is redelivered on restart
    for task in &tasks {
        task.abort();
    }
    join_all(tasks).await;

    tracing::info!("saga runtime shut down gracefully");
}
