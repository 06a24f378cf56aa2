//! Cart error types.

use common::{CartCode, CartItemId, ProductId, UserId};
use inventory::LedgerError;
use thiserror::Error;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// No cart exists with the given code.
    #[error("Cart not found: {0}")]
    CartNotFound(CartCode),

    /// The user has no cart yet.
    #[error("No cart found for user {0}")]
    UserCartNotFound(UserId),

    /// No cart item exists with the given id.
    #[error("Cart item not found: {0}")]
    ItemNotFound(CartItemId),

    /// The product is unknown or currently out of stock.
    #[error("Product not found or out of stock: {0}")]
    ProductUnavailable(ProductId),

    /// Quantities must be positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The requested cart quantity exceeds the product's stock.
    #[error(
        "Requested quantity exceeds available stock for product {product_id}: \
         only {available} available"
    )]
    InsufficientStock { product_id: ProductId, available: u32 },

    /// The cart belongs to a different user.
    #[error("Cart {0} belongs to another user")]
    Forbidden(CartCode),

    /// The inventory ledger failed.
    #[error("Inventory error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Convenience type alias for cart results.
pub type Result<T> = std::result::Result<T, CartError>;
