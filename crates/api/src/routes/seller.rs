//! Seller endpoints over orders holding items of their store.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use common::OrderNumber;
use inventory::InventoryLedger;
use serde::Deserialize;

use crate::AppState;
use crate::auth::RequireUser;
use crate::error::ApiError;
use crate::routes::orders::OrderResponse;

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

/// GET /seller/orders
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.user_id))]
pub async fn list<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.workflow.orders_for_store(&caller).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// PUT /seller/orders/{order_number}/status
#[tracing::instrument(skip(state, caller, payload), fields(user_id = %caller.user_id))]
pub async fn update_status<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
    Path(order_number): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Json(req) = payload?;
    let status = req.status.unwrap_or_default();
    let order = state
        .workflow
        .update_status(&caller, &OrderNumber::new(order_number), status.trim())
        .await?;
    Ok(Json(order.into()))
}
