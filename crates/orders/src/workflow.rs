//! Order workflow: turns a cart into a paid order.

use std::time::Instant;

use cart::CartStore;
use common::{CartCode, Money, OrderNumber, UserId};
use inventory::{InventoryLedger, LedgerError, StockLine};

use crate::book::{OrderBook, OrderSlot};
use crate::caller::Caller;
use crate::error::{OrderError, Result};
use crate::gateway::{Payment, PaymentGateway, PaymentMethod, PaymentOutcome, RefundOutcome};
use crate::model::{Order, OrderItem};
use crate::state::{OrderStatus, PaymentStatus};

/// A successfully placed and paid order.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order: Order,
    pub message: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone)]
pub struct RefundConfirmation {
    pub order: Order,
    pub refund_id: String,
    pub message: String,
}

/// Orchestrates checkout.
///
/// Checkout runs reserve stock → charge payment. If the charge fails the
/// reservation is released and the order is cancelled. Stock shortfalls are
/// detected before anything is kept, so they leave no order behind.
#[derive(Clone)]
pub struct OrderWorkflow<L, G> {
    ledger: L,
    carts: CartStore<L>,
    gateway: G,
    book: OrderBook,
}

impl<L, G> OrderWorkflow<L, G>
where
    L: InventoryLedger + Clone,
    G: PaymentGateway,
{
    pub fn new(carts: CartStore<L>, gateway: G) -> Self {
        Self {
            ledger: carts.ledger().clone(),
            carts,
            gateway,
            book: OrderBook::default(),
        }
    }

    pub fn carts(&self) -> &CartStore<L> {
        &self.carts
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Number of orders held, in any status.
    pub async fn order_count(&self) -> usize {
        self.book.len().await
    }

    /// Places an order for everything in the cart and charges for it.
    ///
    /// On success the cart is emptied. On a declined or failed payment the
    /// order is kept as cancelled, its stock is released and the cart is left
    /// as it was.
    #[tracing::instrument(
        skip(self, shipping_address, reference_number),
        fields(user_id = %user, cart_code = %cart_code, method = method.as_str())
    )]
    pub async fn create_order(
        &self,
        user: UserId,
        cart_code: &CartCode,
        shipping_address: String,
        method: PaymentMethod,
        reference_number: Option<String>,
    ) -> Result<OrderConfirmation> {
        let started = Instant::now();
        let result = self
            .place_order(user, cart_code, shipping_address, method, reference_number)
            .await;
        metrics::histogram!("order_workflow_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn place_order(
        &self,
        user: UserId,
        cart_code: &CartCode,
        shipping_address: String,
        method: PaymentMethod,
        reference_number: Option<String>,
    ) -> Result<OrderConfirmation> {
        // 1. Load the cart
        let cart = self.carts.get(cart_code).await?;
        if cart.is_empty() {
            return Err(OrderError::Validation("Cart is empty".to_string()));
        }

        // 2. Price every line at the current catalog price
        let mut items = Vec::with_capacity(cart.items.len());
        let mut total = Money::zero();
        for line in &cart.items {
            let product = self
                .ledger
                .product(line.product_id)
                .await?
                .ok_or(LedgerError::ProductNotFound(line.product_id))?;
            let item = OrderItem {
                product_id: product.id,
                product_name: product.name,
                store_id: product.store_id,
                quantity: line.quantity,
                price: product.price,
            };
            total += item.line_total();
            items.push(item);
        }

        // 3. Record the pending order
        let (order_number, slot) = self
            .book
            .insert(Order::pending(user, shipping_address, total))
            .await;

        // 4. Reserve stock; a shortfall discards the order
        let lines: Vec<StockLine> = items.iter().map(OrderItem::stock_line).collect();
        if let Err(err) = self.ledger.reserve(&lines).await {
            self.book.remove(&order_number).await;
            tracing::info!(%order_number, error = %err, "order discarded, stock not reserved");
            return Err(match err {
                LedgerError::InsufficientStock {
                    product_id,
                    available,
                } => OrderError::InsufficientStock {
                    product_name: items
                        .iter()
                        .find(|item| item.product_id == product_id)
                        .map(|item| item.product_name.clone())
                        .unwrap_or_else(|| product_id.to_string()),
                    product_id,
                    available,
                },
                other => other.into(),
            });
        }

        // 5. Attach the lines with their price snapshot
        let order = {
            let mut order = slot.lock().await;
            order.items = items;
            order.touch();
            order.clone()
        };
        tracing::info!(%order_number, total = %order.total_amount, "stock reserved");

        // 6. Charge
        let outcome = self
            .gateway
            .process_payment(&order, method, reference_number)
            .await;

        match outcome {
            Ok(PaymentOutcome::Approved {
                transaction_id,
                message,
            }) => {
                // Lines added while the charge was in flight stay in the cart.
                if let Err(err) = self.carts.remove_ordered(cart_code, &cart.items).await {
                    tracing::warn!(
                        %order_number,
                        error = %err,
                        "paid order left its cart untouched"
                    );
                }

                let order = {
                    let mut order = slot.lock().await;
                    order.status = OrderStatus::Confirmed;
                    order.payment_status = PaymentStatus::Paid;
                    order.touch();
                    order.clone()
                };

                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    %order_number,
                    %transaction_id,
                    units = order.item_count(),
                    "order confirmed"
                );
                Ok(OrderConfirmation {
                    order,
                    message,
                    transaction_id,
                })
            }
            Ok(PaymentOutcome::Declined { message }) => self.compensate(&slot, message).await,
            Err(err) => self.compensate(&slot, err.to_string()).await,
        }
    }

    /// Cancels an order whose payment failed and gives its stock back.
    async fn compensate(&self, slot: &OrderSlot, message: String) -> Result<OrderConfirmation> {
        let (order_number, lines) = {
            let mut order = slot.lock().await;
            order.status = OrderStatus::Cancelled;
            order.payment_status = PaymentStatus::Failed;
            order.touch();
            (order.order_number.clone(), order.stock_lines())
        };

        if let Err(err) = self.ledger.release(&lines).await {
            tracing::error!(
                %order_number,
                error = %err,
                "failed to release stock of cancelled order"
            );
            return Err(err.into());
        }

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::warn!(%order_number, reason = %message, "payment failed, order cancelled");
        Err(OrderError::GatewayFailure {
            message,
            order_number,
        })
    }

    /// Refunds a paid order of the caller and cancels it. Stock is not put back.
    #[tracing::instrument(skip(self), fields(user_id = %user, order_number = %order_number))]
    pub async fn request_refund(
        &self,
        user: UserId,
        order_number: &OrderNumber,
    ) -> Result<RefundConfirmation> {
        let slot = self
            .book
            .get(order_number)
            .await
            .ok_or_else(|| OrderError::NotFound(order_number.clone()))?;
        let mut order = slot.lock().await;

        if order.user_id != user {
            return Err(OrderError::NotFound(order_number.clone()));
        }
        if !order.status.is_refundable() {
            return Err(OrderError::Validation(
                "This order is not eligible for a refund".to_string(),
            ));
        }

        let outcome = self
            .gateway
            .refund_payment(&order)
            .await
            .map_err(|err| OrderError::GatewayFailure {
                message: err.to_string(),
                order_number: order_number.clone(),
            })?;

        match outcome {
            RefundOutcome::Refunded { refund_id, message } => {
                order.payment_status = PaymentStatus::Refunded;
                order.status = OrderStatus::Cancelled;
                order.touch();

                metrics::counter!("order_refunds_total").increment(1);
                tracing::info!(%refund_id, "order refunded");
                Ok(RefundConfirmation {
                    order: order.clone(),
                    refund_id,
                    message,
                })
            }
            RefundOutcome::Rejected { message } => {
                tracing::warn!(reason = %message, "refund rejected");
                Err(OrderError::GatewayFailure {
                    message,
                    order_number: order_number.clone(),
                })
            }
        }
    }

    /// Sets an order's status on behalf of a seller with an item in it.
    ///
    /// Any listed status is accepted regardless of the current one.
    #[tracing::instrument(
        skip(self, caller),
        fields(user_id = %caller.user_id, order_number = %order_number)
    )]
    pub async fn update_status(
        &self,
        caller: &Caller,
        order_number: &OrderNumber,
        status: &str,
    ) -> Result<Order> {
        if !caller.is_seller() {
            return Err(OrderError::Forbidden(
                "Only sellers can update order status".to_string(),
            ));
        }
        let store_id = caller
            .store_id
            .ok_or_else(|| OrderError::Validation("You do not have a store".to_string()))?;

        let slot = self
            .book
            .get(order_number)
            .await
            .ok_or_else(|| OrderError::NotFound(order_number.clone()))?;
        let mut order = slot.lock().await;

        if !order.has_item_from(store_id) {
            return Err(OrderError::Forbidden(
                "This order does not contain products from your store".to_string(),
            ));
        }

        if status.is_empty() {
            return Err(OrderError::Validation("A status must be provided".to_string()));
        }
        let next = OrderStatus::parse(status).ok_or_else(|| {
            OrderError::Validation(format!(
                "Invalid status. Valid statuses are: {}",
                OrderStatus::valid_values()
            ))
        })?;

        if !order.status.can_transition_to(next) {
            tracing::debug!(
                from = %order.status,
                to = %next,
                "status change outside the usual lifecycle"
            );
        }
        order.status = next;
        order.touch();
        tracing::info!(status = %next, "order status updated");
        Ok(order.clone())
    }

    /// The caller's orders, newest first.
    pub async fn orders_for_user(&self, user: UserId) -> Vec<Order> {
        self.book.collect(|order| order.user_id == user).await
    }

    pub async fn order_for_user(&self, user: UserId, order_number: &OrderNumber) -> Result<Order> {
        let slot = self
            .book
            .get(order_number)
            .await
            .ok_or_else(|| OrderError::NotFound(order_number.clone()))?;
        let order = slot.lock().await;
        if order.user_id != user {
            return Err(OrderError::NotFound(order_number.clone()));
        }
        Ok(order.clone())
    }

    /// Orders holding at least one item of the seller's store, newest first.
    pub async fn orders_for_store(&self, caller: &Caller) -> Result<Vec<Order>> {
        if !caller.is_seller() {
            return Err(OrderError::Forbidden(
                "Only sellers can view store orders".to_string(),
            ));
        }
        let store_id = caller
            .store_id
            .ok_or_else(|| OrderError::Validation("You do not have a store".to_string()))?;
        Ok(self
            .book
            .collect(|order| order.has_item_from(store_id))
            .await)
    }

    /// The payment record of an order, if a charge was attempted.
    pub async fn payment(&self, order_number: &OrderNumber) -> Option<Payment> {
        self.gateway.payment(order_number).await
    }
}
