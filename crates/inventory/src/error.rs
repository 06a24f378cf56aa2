use thiserror::Error;

use crate::ProductId;

/// Errors that can occur when interacting with the inventory ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The product does not exist in the ledger.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The requested quantity exceeds what the product can supply.
    #[error("Insufficient stock for product {product_id}: only {available} available")]
    InsufficientStock { product_id: ProductId, available: u32 },

    /// A stock movement was requested with a zero or out-of-range quantity.
    #[error("Invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    /// A catalog price below zero.
    #[error("Invalid price for product {product_id}: prices cannot be negative")]
    InvalidPrice { product_id: ProductId },

    /// A product row lock could not be acquired within the configured timeout.
    #[error("Timed out waiting for a product lock")]
    LockTimeout,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
