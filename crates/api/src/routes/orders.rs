//! Customer order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartCode, OrderNumber};
use inventory::InventoryLedger;
use orders::{Order, OrderError, OrderItem, Payment, PaymentError, PaymentMethod};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::RequireUser;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub cart_code: String,
    pub shipping_address: String,
    pub payment_method: String,
    pub reference_number: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_number: String,
    pub status: String,
    pub payment_status: String,
    pub total_amount: String,
    pub total_amount_cents: i64,
    pub shipping_address: String,
    pub created_at: String,
    pub updated_at: String,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub product_name: String,
    pub store_id: String,
    pub quantity: u32,
    pub price: String,
    pub price_cents: i64,
}

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order: OrderResponse,
    pub message: String,
    pub transaction_id: String,
}

#[derive(Serialize)]
pub struct RefundResponse {
    pub message: String,
    pub refund_id: String,
    pub order: OrderResponse,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub payment_method: String,
    pub payment_status: String,
    pub transaction_id: Option<String>,
    pub amount: String,
    pub reference_number: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            product_id: item.product_id.as_i64(),
            product_name: item.product_name,
            store_id: item.store_id.to_string(),
            quantity: item.quantity,
            price: item.price.to_string(),
            price_cents: item.price.cents(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_number: order.order_number.to_string(),
            status: order.status.to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            total_amount: order.total_amount.to_string(),
            total_amount_cents: order.total_amount.cents(),
            shipping_address: order.shipping_address,
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
            items: order.items.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            payment_method: payment.method.as_str().to_string(),
            payment_status: payment.status.as_str().to_string(),
            transaction_id: payment.transaction_id,
            amount: payment.amount.to_string(),
            reference_number: payment.reference_number,
            created_at: payment.created_at.to_rfc3339(),
            updated_at: payment.updated_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /orders/create: check out a cart.
#[tracing::instrument(skip(state, caller, payload), fields(user_id = %caller.user_id))]
pub async fn create<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let Json(req) = payload?;
    if req.cart_code.trim().is_empty() {
        return Err(ApiError::BadRequest("cart_code is required".to_string()));
    }
    let shipping_address = req.shipping_address.trim();
    if shipping_address.is_empty() {
        return Err(ApiError::BadRequest(
            "shipping_address is required".to_string(),
        ));
    }
    let method = PaymentMethod::parse(&req.payment_method).ok_or_else(|| {
        ApiError::BadRequest(
            "Invalid payment_method. Valid methods are: reference, mobile, card".to_string(),
        )
    })?;
    let reference_number = req
        .reference_number
        .filter(|reference| !reference.trim().is_empty());

    let confirmation = state
        .workflow
        .create_order(
            caller.user_id,
            &CartCode::new(req.cart_code),
            shipping_address.to_string(),
            method,
            reference_number,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order: confirmation.order.into(),
            message: confirmation.message,
            transaction_id: confirmation.transaction_id,
        }),
    ))
}

/// GET /orders: the caller's orders, newest first.
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.user_id))]
pub async fn list<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
) -> Json<Vec<OrderResponse>> {
    let orders = state.workflow.orders_for_user(caller.user_id).await;
    Json(orders.into_iter().map(Into::into).collect())
}

/// GET /orders/{order_number}
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.user_id))]
pub async fn get<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
    Path(order_number): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .workflow
        .order_for_user(caller.user_id, &OrderNumber::new(order_number))
        .await?;
    Ok(Json(order.into()))
}

/// POST /orders/{order_number}/refund
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.user_id))]
pub async fn refund<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
    Path(order_number): Path<String>,
) -> Result<Json<RefundResponse>, ApiError> {
    let refund = state
        .workflow
        .request_refund(caller.user_id, &OrderNumber::new(order_number))
        .await?;
    Ok(Json(RefundResponse {
        message: refund.message,
        refund_id: refund.refund_id,
        order: refund.order.into(),
    }))
}

/// GET /orders/{order_number}/payment: the payment record of an own order.
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.user_id))]
pub async fn payment<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
    Path(order_number): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let order_number = OrderNumber::new(order_number);
    state
        .workflow
        .order_for_user(caller.user_id, &order_number)
        .await?;
    let payment = state
        .workflow
        .payment(&order_number)
        .await
        .ok_or_else(|| PaymentError::PaymentNotFound(order_number.clone()))
        .map_err(OrderError::from)?;
    Ok(Json(payment.into()))
}
