//! Shared types for the marketplace checkout core.

mod money;
mod types;

pub use money::Money;
pub use types::{CartCode, CartItemId, OrderNumber, ProductId, StoreId, UserId};
