//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cart::{Cart, CartError, CartItem};
use common::{CartCode, CartItemId, Money, ProductId};
use inventory::InventoryLedger;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::RequireUser;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub cart_code: String,
    pub product_id: i64,
    /// Signed so that negative quantities get a validation error rather than
    /// a deserialization failure.
    #[serde(default = "one")]
    pub quantity: i64,
}

fn one() -> i64 {
    1
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub item_id: i64,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct MergeRequest {
    pub temp_cart_code: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartCreatedResponse {
    pub cart_code: String,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub cart_code: String,
    pub items: Vec<CartItemResponse>,
    pub cart_total: String,
    pub cart_total_cents: i64,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub id: i64,
    pub product_id: i64,
    /// `None` when the catalog no longer lists the product.
    pub product_name: Option<String>,
    pub quantity: u32,
    pub unit_price: Option<String>,
    pub sub_total: Option<String>,
}

#[derive(Serialize)]
pub struct CartStatsResponse {
    pub cart_code: String,
    pub total_quantity: u64,
}

#[derive(Serialize)]
pub struct ItemResponse {
    pub id: i64,
    pub product_id: i64,
    pub quantity: u32,
}

impl From<CartItem> for ItemResponse {
    fn from(item: CartItem) -> Self {
        Self {
            id: item.id.as_i64(),
            product_id: item.product_id.as_i64(),
            quantity: item.quantity,
        }
    }
}

/// Prices every line at the current catalog price.
async fn priced<L: InventoryLedger>(ledger: &L, cart: Cart) -> Result<CartResponse, ApiError> {
    let mut items = Vec::with_capacity(cart.items.len());
    let mut total = Money::zero();

    for item in cart.items {
        let product = ledger.product(item.product_id).await?;
        let sub_total = product.as_ref().map(|p| p.price.multiply(item.quantity));
        if let Some(sub_total) = sub_total {
            total += sub_total;
        }
        items.push(CartItemResponse {
            id: item.id.as_i64(),
            product_id: item.product_id.as_i64(),
            product_name: product.as_ref().map(|p| p.name.clone()),
            quantity: item.quantity,
            unit_price: product.as_ref().map(|p| p.price.to_string()),
            sub_total: sub_total.map(|m| m.to_string()),
        });
    }

    Ok(CartResponse {
        cart_code: cart.code.to_string(),
        items,
        cart_total: total.to_string(),
        cart_total_cents: total.cents(),
    })
}

fn positive_quantity(quantity: i64) -> Result<u32, ApiError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| ApiError::BadRequest("Quantity must be greater than zero".to_string()))
}

// -- Handlers --

/// POST /cart/create: open an anonymous cart.
#[tracing::instrument(skip(state))]
pub async fn create<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> (StatusCode, Json<CartCreatedResponse>) {
    let cart = state.carts.create().await;
    (
        StatusCode::CREATED,
        Json(CartCreatedResponse {
            cart_code: cart.code.to_string(),
        }),
    )
}

/// GET /cart/{cart_code}: cart with priced lines.
#[tracing::instrument(skip(state))]
pub async fn get<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(code): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get(&CartCode::new(code)).await?;
    Ok(Json(priced(state.carts.ledger(), cart).await?))
}

/// GET /cart/{cart_code}/stats: number of units in the cart.
#[tracing::instrument(skip(state))]
pub async fn stats<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(code): Path<String>,
) -> Result<Json<CartStatsResponse>, ApiError> {
    let cart = state.carts.get(&CartCode::new(code)).await?;
    Ok(Json(CartStatsResponse {
        total_quantity: cart.total_quantity(),
        cart_code: cart.code.to_string(),
    }))
}

/// POST /cart/user: the caller's cart, created on first use.
#[tracing::instrument(skip(state, caller))]
pub async fn open_user_cart<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_or_create_for_user(caller.user_id).await;
    Ok(Json(priced(state.carts.ledger(), cart).await?))
}

/// GET /cart/user: the caller's cart.
#[tracing::instrument(skip(state, caller))]
pub async fn user_cart<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_for_user(caller.user_id).await?;
    Ok(Json(priced(state.carts.ledger(), cart).await?))
}

/// POST /cart/add: add units of a product, creating the cart if needed.
///
/// `quantity` defaults to one.
#[tracing::instrument(skip(state, payload))]
pub async fn add_item<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    payload: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<Json<CartResponse>, ApiError> {
    let Json(req) = payload?;
    if req.cart_code.trim().is_empty() {
        return Err(ApiError::BadRequest("cart_code is required".to_string()));
    }
    let quantity = positive_quantity(req.quantity)?;

    let cart = state
        .carts
        .add_item(
            &CartCode::new(req.cart_code),
            ProductId::new(req.product_id),
            quantity,
        )
        .await?;
    Ok(Json(priced(state.carts.ledger(), cart).await?))
}

/// PUT /cart/update: set the quantity of a cart item.
#[tracing::instrument(skip(state, caller, payload), fields(user_id = %caller.user_id))]
pub async fn update_item<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
    payload: Result<Json<UpdateItemRequest>, JsonRejection>,
) -> Result<Json<ItemResponse>, ApiError> {
    let Json(req) = payload?;
    let quantity = positive_quantity(req.quantity)?;
    let item = state
        .carts
        .update_item_quantity(CartItemId::new(req.item_id), quantity)
        .await?;
    Ok(Json(item.into()))
}

/// DELETE /cart/item/{id}
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.user_id))]
pub async fn delete_item<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.carts.delete_item(CartItemId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /cart/merge: fold an anonymous cart into the caller's cart.
#[tracing::instrument(skip(state, caller, payload), fields(user_id = %caller.user_id))]
pub async fn merge<L: InventoryLedger + Clone + 'static>(
    State(state): State<Arc<AppState<L>>>,
    RequireUser(caller): RequireUser,
    payload: Result<Json<MergeRequest>, JsonRejection>,
) -> Result<Json<CartResponse>, ApiError> {
    let Json(req) = payload?;
    if req.temp_cart_code.trim().is_empty() {
        return Err(ApiError::BadRequest("temp_cart_code is required".to_string()));
    }

    let cart = state
        .carts
        .merge(&CartCode::new(req.temp_cart_code), caller.user_id)
        .await
        .map_err(|err| match err {
            CartError::Ledger(err) => {
                tracing::error!(error = %err, "cart merge aborted");
                ApiError::Internal("Could not merge carts".to_string())
            }
            other => other.into(),
        })?;
    Ok(Json(priced(state.carts.ledger(), cart).await?))
}
