//! Orders and order lines.

use chrono::{DateTime, Utc};
use common::{Money, OrderNumber, ProductId, StoreId, UserId};
use inventory::StockLine;
use serde::{Deserialize, Serialize};

use crate::state::{OrderStatus, PaymentStatus};

/// One line of an order with the price paid at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub store_id: StoreId,
    pub quantity: u32,
    /// Unit price when the order was placed. Later catalog changes do not
    /// affect it.
    pub price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }

    pub fn stock_line(&self) -> StockLine {
        StockLine::new(self.product_id, self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_amount: Money,
    pub shipping_address: String,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A new pending order with no lines yet.
    pub fn pending(
        user_id: UserId,
        shipping_address: impl Into<String>,
        total_amount: Money,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_number: OrderNumber::generate(),
            user_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_amount,
            shipping_address: shipping_address.into(),
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if any line was sold by `store_id`.
    pub fn has_item_from(&self, store_id: StoreId) -> bool {
        self.items.iter().any(|item| item.store_id == store_id)
    }

    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items.iter().map(OrderItem::stock_line).collect()
    }

    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
