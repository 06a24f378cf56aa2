//! Cart aggregate.

use chrono::{DateTime, Utc};
use common::{CartCode, CartItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// Who a cart belongs to.
///
/// Anonymous carts are addressed only by their code. Owned carts are also
/// reachable through their user, and a user owns at most one cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum CartOwner {
    Anonymous,
    Owned(UserId),
}

impl CartOwner {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CartOwner::Anonymous => None,
            CartOwner::Owned(user_id) => Some(*user_id),
        }
    }
}

/// One product line of a cart. Quantity is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A provisional basket. Holds no stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub code: CartCode,
    pub owner: CartOwner,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub(crate) fn new(code: CartCode, owner: CartOwner) -> Self {
        let now = Utc::now();
        Self {
            code,
            owner,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of all item quantities.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// The line holding `product_id`, if any. Each product appears at most once.
    pub fn item_for(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    pub(crate) fn item_for_mut(&mut self, product_id: ProductId) -> Option<&mut CartItem> {
        self.items
            .iter_mut()
            .find(|item| item.product_id == product_id)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
