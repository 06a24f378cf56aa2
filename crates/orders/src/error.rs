//! Order workflow error types.

use cart::CartError;
use common::{OrderNumber, ProductId};
use inventory::LedgerError;
use thiserror::Error;

use crate::gateway::PaymentError;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// No order with this number is visible to the caller.
    #[error("Order not found: {0}")]
    NotFound(OrderNumber),

    /// The request is not valid for the order or caller.
    #[error("{0}")]
    Validation(String),

    /// The caller may not act on this order.
    #[error("{0}")]
    Forbidden(String),

    /// A cart line exceeds the stock left. No order was kept.
    #[error("Product {product_name} does not have enough stock: only {available} available")]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: u32,
    },

    /// The payment processor declined or failed. The order was cancelled and
    /// its stock released, or for refunds the order was left unchanged.
    #[error("{message}")]
    GatewayFailure {
        message: String,
        order_number: OrderNumber,
    },

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Convenience type alias for order results.
pub type Result<T> = std::result::Result<T, OrderError>;
