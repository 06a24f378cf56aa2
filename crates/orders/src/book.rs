//! In-process order storage.

use std::collections::HashMap;
use std::sync::Arc;

use common::OrderNumber;
use tokio::sync::{Mutex, RwLock};

use crate::model::Order;

/// An order behind its own lock.
pub(crate) type OrderSlot = Arc<Mutex<Order>>;

/// Every order of the process, keyed by order number.
#[derive(Clone, Default)]
pub(crate) struct OrderBook {
    orders: Arc<RwLock<HashMap<OrderNumber, OrderSlot>>>,
}

impl OrderBook {
    /// Stores a new order, drawing a fresh order number on collision.
    pub(crate) async fn insert(&self, mut order: Order) -> (OrderNumber, OrderSlot) {
        let mut orders = self.orders.write().await;
        while orders.contains_key(&order.order_number) {
            order.order_number = OrderNumber::generate();
        }
        let number = order.order_number.clone();
        let slot = Arc::new(Mutex::new(order));
        orders.insert(number.clone(), slot.clone());
        (number, slot)
    }

    pub(crate) async fn get(&self, number: &OrderNumber) -> Option<OrderSlot> {
        self.orders.read().await.get(number).cloned()
    }

    pub(crate) async fn remove(&self, number: &OrderNumber) {
        self.orders.write().await.remove(number);
    }

    /// Snapshots every order matching `filter`, newest first.
    pub(crate) async fn collect(&self, filter: impl Fn(&Order) -> bool) -> Vec<Order> {
        let slots: Vec<OrderSlot> = self.orders.read().await.values().cloned().collect();

        let mut matched = Vec::new();
        for slot in slots {
            let order = slot.lock().await;
            if filter(&*order) {
                matched.push(order.clone());
            }
        }
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched
    }

    pub(crate) async fn len(&self) -> usize {
        self.orders.read().await.len()
    }
}
