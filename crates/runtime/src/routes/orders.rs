//! Order endpoints: place an order and watch its saga resolve.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, OrderId};
use order_service::Order;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub amount_cents: i64,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: i64,
    pub amount_cents: i64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id.as_i64(),
            amount_cents: order.amount.cents(),
            status: order.status.to_string(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

/// POST /orders — places an order; settlement follows asynchronously.
pub async fn place(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .order_service
        .place_order(Money::from_cents(req.amount_cents))
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders/{id} — returns an order and its saga status.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid order ID: {id}")))?;
    let order = state.order_service.get_order(order_id).await?;
    Ok(Json(order.into()))
}
