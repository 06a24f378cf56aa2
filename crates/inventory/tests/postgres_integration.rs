//! PostgreSQL ledger integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p inventory --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use inventory::{
    InventoryLedger, LedgerError, Money, PostgresInventoryLedger, Product, ProductId, StockLine,
    StoreId,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_products_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh ledger with its own pool and an empty products table
async fn get_test_ledger() -> PostgresInventoryLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE products")
        .execute(&pool)
        .await
        .unwrap();

    PostgresInventoryLedger::new(pool)
}

fn product(id: i64, stock: u32) -> Product {
    Product::new(
        ProductId::new(id),
        format!("Product {id}"),
        Money::from_cents(1099),
        stock,
        StoreId::new(),
    )
}

async fn stock_of(ledger: &PostgresInventoryLedger, id: i64) -> u32 {
    ledger
        .product(ProductId::new(id))
        .await
        .unwrap()
        .unwrap()
        .stock_quantity
}

#[tokio::test]
#[serial]
async fn register_and_read_product() {
    let ledger = get_test_ledger().await;
    let p = product(1, 10);

    ledger.register_product(p.clone()).await.unwrap();

    let stored = ledger.product(ProductId::new(1)).await.unwrap().unwrap();
    assert_eq!(stored, p);
    assert!(ledger.product(ProductId::new(2)).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn reserve_decrements_and_release_restores() {
    let ledger = get_test_ledger().await;
    ledger.register_product(product(1, 10)).await.unwrap();

    ledger.reserve(&[StockLine::new(ProductId::new(1), 2)]).await.unwrap();
    assert_eq!(stock_of(&ledger, 1).await, 8);

    ledger.release(&[StockLine::new(ProductId::new(1), 2)]).await.unwrap();
    assert_eq!(stock_of(&ledger, 1).await, 10);
}

#[tokio::test]
#[serial]
async fn reserve_to_zero_clears_in_stock() {
    let ledger = get_test_ledger().await;
    ledger.register_product(product(1, 1)).await.unwrap();

    ledger.reserve(&[StockLine::new(ProductId::new(1), 1)]).await.unwrap();
    let p = ledger.product(ProductId::new(1)).await.unwrap().unwrap();
    assert_eq!(p.stock_quantity, 0);
    assert!(!p.in_stock);

    ledger.release(&[StockLine::new(ProductId::new(1), 1)]).await.unwrap();
    let p = ledger.product(ProductId::new(1)).await.unwrap().unwrap();
    assert!(p.in_stock);
}

#[tokio::test]
#[serial]
async fn failed_reservation_leaves_every_row_untouched() {
    let ledger = get_test_ledger().await;
    ledger.register_product(product(1, 10)).await.unwrap();
    ledger.register_product(product(2, 1)).await.unwrap();

    let result = ledger
        .reserve(&[StockLine::new(ProductId::new(1), 5), StockLine::new(ProductId::new(2), 3)])
        .await;

    assert!(matches!(
        result,
        Err(LedgerError::InsufficientStock { product_id, available: 1 })
            if product_id == ProductId::new(2)
    ));
    assert_eq!(stock_of(&ledger, 1).await, 10);
    assert_eq!(stock_of(&ledger, 2).await, 1);
}

#[tokio::test]
#[serial]
async fn reserve_unknown_product() {
    let ledger = get_test_ledger().await;
    ledger.register_product(product(1, 10)).await.unwrap();

    let result = ledger
        .reserve(&[StockLine::new(ProductId::new(1), 1), StockLine::new(ProductId::new(42), 1)])
        .await;
    assert!(matches!(result, Err(LedgerError::ProductNotFound(id)) if id == ProductId::new(42)));
    assert_eq!(stock_of(&ledger, 1).await, 10);
}

#[tokio::test]
#[serial]
async fn concurrent_reservations_for_last_unit() {
    let ledger = get_test_ledger().await;
    ledger.register_product(product(1, 1)).await.unwrap();

    let lines_a = [StockLine::new(ProductId::new(1), 1)];
    let lines_b = [StockLine::new(ProductId::new(1), 1)];
    let (a, b) = tokio::join!(ledger.reserve(&lines_a), ledger.reserve(&lines_b),);

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    assert_eq!(stock_of(&ledger, 1).await, 0);
}

#[tokio::test]
#[serial]
async fn lock_timeout_is_reported() {
    let ledger = get_test_ledger()
        .await
        .with_lock_timeout(Duration::from_millis(100));
    ledger.register_product(product(1, 5)).await.unwrap();

    // Hold the row lock from another transaction.
    let mut blocker = ledger.pool().begin().await.unwrap();
    sqlx::query("SELECT id FROM products WHERE id = 1 FOR UPDATE")
        .execute(&mut *blocker)
        .await
        .unwrap();

    let result = ledger.reserve(&[StockLine::new(ProductId::new(1), 1)]).await;
    assert!(matches!(result, Err(LedgerError::LockTimeout)));

    blocker.rollback().await.unwrap();
    assert_eq!(stock_of(&ledger, 1).await, 5);
}

#[tokio::test]
#[serial]
async fn update_price_does_not_touch_stock() {
    let ledger = get_test_ledger().await;
    ledger.register_product(product(1, 7)).await.unwrap();

    ledger
        .update_price(ProductId::new(1), Money::from_cents(2000))
        .await
        .unwrap();

    let p = ledger.product(ProductId::new(1)).await.unwrap().unwrap();
    assert_eq!(p.price, Money::from_cents(2000));
    assert_eq!(p.stock_quantity, 7);

    let missing = ledger
        .update_price(ProductId::new(9), Money::from_cents(1))
        .await;
    assert!(matches!(missing, Err(LedgerError::ProductNotFound(_))));
}
