//! Product rows and stock movement lines.

use serde::{Deserialize, Serialize};

use crate::{Money, ProductId, StoreId};

/// A product row as seen by the checkout core.
///
/// Catalog facts (name, price, store) belong to the catalog collaborator.
/// `stock_quantity` and `in_stock` are owned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock_quantity: u32,
    pub in_stock: bool,
    pub store_id: StoreId,
    #[serde(default = "default_true")]
    pub store_active: bool,
}

fn default_true() -> bool {
    true
}

impl Product {
    /// Creates an in-stock product of an active store.
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        price: Money,
        stock_quantity: u32,
        store_id: StoreId,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            stock_quantity,
            in_stock: stock_quantity > 0,
            store_id,
            store_active: true,
        }
    }

    /// Returns true if the product can supply `quantity` units right now.
    pub fn can_supply(&self, quantity: u32) -> bool {
        self.in_stock && self.stock_quantity >= quantity
    }

    /// Removes `quantity` units. Callers must check [`Product::can_supply`] first.
    pub(crate) fn take(&mut self, quantity: u32) {
        self.stock_quantity -= quantity;
        if self.stock_quantity == 0 {
            self.in_stock = false;
        }
    }

    /// Puts `quantity` units back.
    pub(crate) fn put_back(&mut self, quantity: u32) {
        self.stock_quantity = self.stock_quantity.saturating_add(quantity);
        if self.stock_quantity > 0 {
            self.in_stock = true;
        }
    }
}

/// One product/quantity pair of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(stock: u32) -> Product {
        Product::new(ProductId::new(1), "Widget", Money::from_cents(1099), stock, StoreId::new())
    }

    #[test]
    fn test_new_product_in_stock_flag_follows_quantity() {
        assert!(widget(3).in_stock);
        assert!(!widget(0).in_stock);
    }

    #[test]
    fn test_can_supply() {
        let mut product = widget(5);
        assert!(product.can_supply(5));
        assert!(!product.can_supply(6));

        product.in_stock = false;
        assert!(!product.can_supply(1));
    }

    #[test]
    fn test_take_to_zero_clears_in_stock() {
        let mut product = widget(2);
        product.take(2);
        assert_eq!(product.stock_quantity, 0);
        assert!(!product.in_stock);
    }

    #[test]
    fn test_put_back_restores_in_stock() {
        let mut product = widget(0);
        product.put_back(3);
        assert_eq!(product.stock_quantity, 3);
        assert!(product.in_stock);
    }

    #[test]
    fn test_store_active_defaults_when_absent() {
        let json = serde_json::json!({
            "id": 7,
            "name": "Lamp",
            "price": 2500,
            "stock_quantity": 4,
            "in_stock": true,
            "store_id": "00000000-0000-0000-0000-000000000001"
        });
        let product: Product = serde_json::from_value(json).unwrap();
        assert!(product.store_active);
        assert_eq!(product.price, Money::from_cents(2500));
    }
}
