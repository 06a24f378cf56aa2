//! Start-up catalog seeding.
//!
//! The catalog itself lives outside this service. For local runs and demos a
//! JSON file can stand in for it:
//!
//! ```json
//! [
//!   { "id": 1, "name": "Lamp", "price_cents": 1099, "stock_quantity": 10,
//!     "store_id": "6f1c0d3e-5b8a-4a51-9e43-2f0c8f7a9b10" }
//! ]
//! ```

use std::path::Path;

use common::{Money, ProductId, StoreId};
use inventory::{InventoryLedger, LedgerError, Product};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// One product of a catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub price_cents: i64,
    pub stock_quantity: u32,
    pub store_id: StoreId,
    #[serde(default = "default_active")]
    pub store_active: bool,
}

fn default_active() -> bool {
    true
}

impl From<CatalogEntry> for Product {
    fn from(entry: CatalogEntry) -> Self {
        let mut product = Product::new(
            ProductId::new(entry.id),
            entry.name,
            Money::from_cents(entry.price_cents),
            entry.stock_quantity,
            entry.store_id,
        );
        product.store_active = entry.store_active;
        product
    }
}

/// Parses a catalog document.
pub fn parse(json: &str) -> Result<Vec<Product>, CatalogError> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
    Ok(entries.into_iter().map(Product::from).collect())
}

/// Registers every product of the catalog file with the ledger.
///
/// Returns the number of products registered.
#[tracing::instrument(skip(ledger))]
pub async fn seed<L: InventoryLedger>(ledger: &L, path: &Path) -> Result<usize, CatalogError> {
    let json = tokio::fs::read_to_string(path).await?;
    let products = parse(&json)?;
    let count = products.len();
    for product in products {
        ledger.register_product(product).await?;
    }
    tracing::info!(count, "catalog loaded");
    Ok(count)
}
