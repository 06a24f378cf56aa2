//! HTTP API server with observability for the marketplace checkout core.
//!
//! Provides REST endpoints for carts, checkout, refunds and seller order
//! handling, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use cart::CartStore;
use inventory::InventoryLedger;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{GatewayMode, OrderWorkflow, SimulatedPaymentGateway};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<L> {
    pub carts: CartStore<L>,
    pub workflow: OrderWorkflow<L, SimulatedPaymentGateway>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L: InventoryLedger + Clone + 'static>(
    state: Arc<AppState<L>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Carts
        .route("/cart/create", post(routes::cart::create::<L>))
        .route(
            "/cart/user",
            get(routes::cart::user_cart::<L>).post(routes::cart::open_user_cart::<L>),
        )
        .route("/cart/add", post(routes::cart::add_item::<L>))
        .route("/cart/update", put(routes::cart::update_item::<L>))
        .route("/cart/item/{id}", delete(routes::cart::delete_item::<L>))
        .route("/cart/merge", post(routes::cart::merge::<L>))
        .route("/cart/{cart_code}", get(routes::cart::get::<L>))
        .route("/cart/{cart_code}/stats", get(routes::cart::stats::<L>))
        // Orders
        .route("/orders/create", post(routes::orders::create::<L>))
        .route("/orders", get(routes::orders::list::<L>))
        .route("/orders/{order_number}", get(routes::orders::get::<L>))
        .route(
            "/orders/{order_number}/refund",
            post(routes::orders::refund::<L>),
        )
        .route(
            "/orders/{order_number}/payment",
            get(routes::orders::payment::<L>),
        )
        // Sellers
        .route("/seller/orders", get(routes::seller::list::<L>))
        .route(
            "/seller/orders/{order_number}/status",
            put(routes::seller::update_status::<L>),
        )
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

/// Creates the application state over `ledger` with a simulated payment
/// gateway in `mode`.
pub fn create_state<L: InventoryLedger + Clone + 'static>(
    ledger: L,
    mode: GatewayMode,
) -> Arc<AppState<L>> {
    let carts = CartStore::new(ledger);
    let workflow = OrderWorkflow::new(carts.clone(), SimulatedPaymentGateway::new(mode));
    Arc::new(AppState { carts, workflow })
}
