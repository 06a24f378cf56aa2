use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::{LedgerError, Result};
use crate::ledger::{DEFAULT_LOCK_TIMEOUT, InventoryLedger, check_price, lock_plan};
use crate::product::{Product, StockLine};
use crate::{Money, ProductId};

type ProductRow = Arc<Mutex<Product>>;

/// In-memory inventory ledger.
///
/// Every product row sits behind its own mutex, which plays the part of a
/// database row lock. Stock movements lock rows in ascending product id order
/// and hold all of them until the movement is applied.
#[derive(Clone)]
pub struct InMemoryInventoryLedger {
    rows: Arc<RwLock<HashMap<ProductId, ProductRow>>>,
    lock_timeout: Duration,
}

impl Default for InMemoryInventoryLedger {
    fn default() -> Self {
        Self {
            rows: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryInventoryLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long a movement waits for a row lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Creates a ledger pre-populated with the given products.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let ledger = Self::new();
        {
            let mut rows = ledger.rows.write().await;
            for product in products {
                rows.insert(product.id, Arc::new(Mutex::new(product)));
            }
        }
        ledger
    }

    async fn row(&self, product_id: ProductId) -> Option<ProductRow> {
        self.rows.read().await.get(&product_id).cloned()
    }

    async fn lock_row(&self, row: ProductRow) -> Result<OwnedMutexGuard<Product>> {
        tokio::time::timeout(self.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| LedgerError::LockTimeout)
    }

    /// Locks the rows of every product in the plan, in plan (id) order.
    async fn lock_rows<'a>(
        &self,
        product_ids: impl Iterator<Item = &'a ProductId>,
    ) -> Result<Vec<OwnedMutexGuard<Product>>> {
        let rows: Vec<ProductRow> = {
            let registry = self.rows.read().await;
            product_ids
                .map(|id| {
                    registry
                        .get(id)
                        .cloned()
                        .ok_or(LedgerError::ProductNotFound(*id))
                })
                .collect::<Result<_>>()?
        };

        let mut guards = Vec::with_capacity(rows.len());
        for row in rows {
            guards.push(self.lock_row(row).await?);
        }
        Ok(guards)
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn reserve(&self, items: &[StockLine]) -> Result<()> {
        let plan = lock_plan(items)?;
        let mut guards = self.lock_rows(plan.keys()).await?;

        for (product, quantity) in guards.iter().zip(plan.values()) {
            if !product.can_supply(*quantity) {
                metrics::counter!("inventory_reservation_failures_total").increment(1);
                tracing::info!(
                    product_id = %product.id,
                    requested = quantity,
                    available = product.stock_quantity,
                    "reservation rejected"
                );
                return Err(LedgerError::InsufficientStock {
                    product_id: product.id,
                    available: if product.in_stock {
                        product.stock_quantity
                    } else {
                        0
                    },
                });
            }
        }

        for (product, quantity) in guards.iter_mut().zip(plan.values()) {
            product.take(*quantity);
        }

        metrics::counter!("inventory_reservations_total").increment(1);
        Ok(())
    }

    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn release(&self, items: &[StockLine]) -> Result<()> {
        let plan = lock_plan(items)?;
        let mut guards = self.lock_rows(plan.keys()).await?;

        for (product, quantity) in guards.iter_mut().zip(plan.values()) {
            product.put_back(*quantity);
        }

        metrics::counter!("inventory_releases_total").increment(1);
        Ok(())
    }

    async fn product(&self, product_id: ProductId) -> Result<Option<Product>> {
        match self.row(product_id).await {
            Some(row) => Ok(Some(self.lock_row(row).await?.clone())),
            None => Ok(None),
        }
    }

    async fn register_product(&self, mut product: Product) -> Result<()> {
        check_price(product.id, product.price)?;
        if product.stock_quantity == 0 {
            product.in_stock = false;
        }

        if let Some(row) = self.row(product.id).await {
            *self.lock_row(row).await? = product;
            return Ok(());
        }

        let mut rows = self.rows.write().await;
        match rows.get(&product.id).cloned() {
            // Registered concurrently between the read above and this write.
            Some(row) => {
                drop(rows);
                *self.lock_row(row).await? = product;
            }
            None => {
                rows.insert(product.id, Arc::new(Mutex::new(product)));
            }
        }
        Ok(())
    }

    async fn update_price(&self, product_id: ProductId, price: Money) -> Result<()> {
        check_price(product_id, price)?;
        let row = self
            .row(product_id)
            .await
            .ok_or(LedgerError::ProductNotFound(product_id))?;
        self.lock_row(row).await?.price = price;
        Ok(())
    }
}
