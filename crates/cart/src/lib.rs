//! Shopping carts for the marketplace checkout core.
//!
//! Carts are provisional: quantities are checked against the stock level when
//! an item is added or changed, but nothing is reserved until an order is
//! created. Each cart is locked on its own, so edits to different carts never
//! contend with each other.

pub mod error;
pub mod model;
pub mod store;

pub use error::{CartError, Result};
pub use model::{Cart, CartItem, CartOwner};
pub use store::CartStore;
