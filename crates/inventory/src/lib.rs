//! Inventory ledger for the marketplace checkout core.
//!
//! The ledger is the only component allowed to change a product's stock
//! count. Stock moves exclusively through [`InventoryLedger::reserve`] and
//! [`InventoryLedger::release`], both of which lock the affected product rows
//! in ascending [`ProductId`] order so multi-product operations cannot
//! deadlock against each other.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod product;

pub use common::{Money, ProductId, StoreId};
pub use error::{LedgerError, Result};
pub use ledger::{DEFAULT_LOCK_TIMEOUT, InventoryLedger};
pub use memory::InMemoryInventoryLedger;
pub use postgres::PostgresInventoryLedger;
pub use product::{Product, StockLine};
