//! Operator view of staged events that the relay gave up on.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use outbox::{OutboxStatus, OutboxStore, StagedEvent};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// GET /outbox/{side}/failed — lists FAILED rows of the `order` or `payment` outbox.
pub async fn failed(
    State(state): State<Arc<AppState>>,
    Path(side): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<StagedEvent>>, ApiError> {
    let store = match side.as_str() {
        "order" => &state.order_outbox,
        "payment" => &state.payment_outbox,
        other => return Err(ApiError::NotFound(format!("Unknown outbox: {other}"))),
    };

    let rows = store
        .list_by_status(OutboxStatus::Failed, params.limit.unwrap_or(DEFAULT_LIMIT))
        .await?;
    Ok(Json(rows))
}
