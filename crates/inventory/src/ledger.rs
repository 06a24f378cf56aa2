//! The inventory ledger trait.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LedgerError, Result};
use crate::product::{Product, StockLine};
use crate::{Money, ProductId};

/// How long a stock movement waits for a product row lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Sole authority over product stock counts.
///
/// Implementations must lock every product row touched by `reserve` or
/// `release` in ascending `ProductId` order and apply the movement
/// all-or-nothing.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Atomically takes stock for every line.
    ///
    /// Fails with [`LedgerError::InsufficientStock`] if any product is out of
    /// stock or short; in that case no product is decremented.
    async fn reserve(&self, items: &[StockLine]) -> Result<()>;

    /// Puts stock back for every line. Compensating action for `reserve`.
    async fn release(&self, items: &[StockLine]) -> Result<()>;

    /// Reads a single product row.
    async fn product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a product row on behalf of the catalog.
    async fn register_product(&self, product: Product) -> Result<()>;

    /// Changes a product's catalog price. Stock is not touched.
    async fn update_price(&self, product_id: ProductId, price: Money) -> Result<()>;
}

/// Coalesces stock lines into per-product totals in lock order.
///
/// Zero quantities are rejected and duplicate products are summed.
pub(crate) fn lock_plan(items: &[StockLine]) -> Result<BTreeMap<ProductId, u32>> {
    let mut plan = BTreeMap::new();
    for line in items {
        if line.quantity == 0 {
            return Err(LedgerError::InvalidQuantity {
                product_id: line.product_id,
            });
        }
        let total: &mut u32 = plan.entry(line.product_id).or_default();
        *total = total
            .checked_add(line.quantity)
            .ok_or(LedgerError::InvalidQuantity {
                product_id: line.product_id,
            })?;
    }
    Ok(plan)
}

/// Rejects prices below zero.
pub(crate) fn check_price(product_id: ProductId, price: Money) -> Result<()> {
    if price.cents() < 0 {
        return Err(LedgerError::InvalidPrice { product_id });
    }
    Ok(())
}
