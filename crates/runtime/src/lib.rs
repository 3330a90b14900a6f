//! Process hosting both ledgers of the order/payment saga.
//!
//! Runs each ledger's outbox relay, one listener per partition for each
//! consuming group, and a small admin HTTP surface with health, Prometheus
//! metrics, order placement and the list of events the relay gave up on.

pub mod config;
pub mod error;
pub mod routes;
pub mod saga;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use order_service::{OrderService, OrderStore};
use outbox::OutboxStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use saga::{InMemorySaga, SagaComponents};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub order_service: OrderService<Arc<dyn OrderStore>>,
    pub order_outbox: Arc<dyn OutboxStore>,
    pub payment_outbox: Arc<dyn OutboxStore>,
}

impl AppState {
    pub fn new(components: &SagaComponents) -> Arc<Self> {
        Arc::new(Self {
            order_service: OrderService::new(Arc::clone(&components.orders)),
            order_outbox: Arc::clone(&components.order_outbox),
            payment_outbox: Arc::clone(&components.payment_outbox),
        })
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::place))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/outbox/{side}/failed", get(routes::outbox::failed))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
