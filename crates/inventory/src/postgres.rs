use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::ledger::{DEFAULT_LOCK_TIMEOUT, InventoryLedger, check_price, lock_plan};
use crate::product::{Product, StockLine};
use crate::{Money, ProductId, StoreId};

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// PostgreSQL-backed inventory ledger.
///
/// Stock movements run in a single transaction that locks the affected rows
/// with `SELECT ... ORDER BY id FOR UPDATE`, so concurrent movements on the
/// same products are serialized and always lock in the same order.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresInventoryLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets how long a movement waits for row locks.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Begins a transaction whose lock waits are bounded by `lock_timeout`.
    async fn begin_locked(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        // SET cannot take bind parameters; the value is a plain integer.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        Ok(tx)
    }

    /// Locks the given product rows in id order and returns
    /// `id -> (stock_quantity, in_stock)`.
    async fn lock_rows(
        tx: &mut Transaction<'static, Postgres>,
        product_ids: &[i64],
    ) -> Result<HashMap<i64, (i32, bool)>> {
        let rows = sqlx::query(
            r#"
            SELECT id, stock_quantity, in_stock
            FROM products
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(product_ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_lock_error)?;

        rows.into_iter()
            .map(|row| -> Result<(i64, (i32, bool))> {
                Ok((
                    row.try_get::<i64, _>("id")?,
                    (row.try_get("stock_quantity")?, row.try_get("in_stock")?),
                ))
            })
            .collect()
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let stock: i32 = row.try_get("stock_quantity")?;
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock_quantity: u32::try_from(stock).unwrap_or(0),
            in_stock: row.try_get("in_stock")?,
            store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
            store_active: row.try_get("store_active")?,
        })
    }
}

fn map_lock_error(e: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE)
    {
        return LedgerError::LockTimeout;
    }
    LedgerError::Database(e)
}

fn to_sql_quantity(product_id: ProductId, quantity: u32) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| LedgerError::InvalidQuantity { product_id })
}

#[async_trait]
impl InventoryLedger for PostgresInventoryLedger {
    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn reserve(&self, items: &[StockLine]) -> Result<()> {
        let plan = lock_plan(items)?;
        let ids: Vec<i64> = plan.keys().map(ProductId::as_i64).collect();

        let mut tx = self.begin_locked().await?;
        let locked = Self::lock_rows(&mut tx, &ids).await?;

        for (product_id, quantity) in &plan {
            let (stock, in_stock) = *locked
                .get(&product_id.as_i64())
                .ok_or(LedgerError::ProductNotFound(*product_id))?;
            if !in_stock || i64::from(stock) < i64::from(*quantity) {
                metrics::counter!("inventory_reservation_failures_total").increment(1);
                // Dropping the transaction rolls it back and releases the locks.
                return Err(LedgerError::InsufficientStock {
                    product_id: *product_id,
                    available: if in_stock {
                        u32::try_from(stock).unwrap_or(0)
                    } else {
                        0
                    },
                });
            }
        }

        for (product_id, quantity) in &plan {
            sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity - $2,
                    in_stock = stock_quantity - $2 > 0,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(product_id.as_i64())
            .bind(to_sql_quantity(*product_id, *quantity)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        metrics::counter!("inventory_reservations_total").increment(1);
        Ok(())
    }

    #[tracing::instrument(skip(self, items), fields(lines = items.len()))]
    async fn release(&self, items: &[StockLine]) -> Result<()> {
        let plan = lock_plan(items)?;
        let ids: Vec<i64> = plan.keys().map(ProductId::as_i64).collect();

        let mut tx = self.begin_locked().await?;
        let locked = Self::lock_rows(&mut tx, &ids).await?;

        for (product_id, quantity) in &plan {
            if !locked.contains_key(&product_id.as_i64()) {
                return Err(LedgerError::ProductNotFound(*product_id));
            }
            sqlx::query(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity + $2,
                    in_stock = CASE WHEN stock_quantity + $2 > 0 THEN TRUE ELSE in_stock END,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(product_id.as_i64())
            .bind(to_sql_quantity(*product_id, *quantity)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        metrics::counter!("inventory_releases_total").increment(1);
        Ok(())
    }

    async fn product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, price_cents, stock_quantity, in_stock, store_id, store_active
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn register_product(&self, product: Product) -> Result<()> {
        check_price(product.id, product.price)?;
        let stock = to_sql_quantity(product.id, product.stock_quantity)?;

        sqlx::query(
            r#"
            INSERT INTO products
                (id, name, price_cents, stock_quantity, in_stock, store_id, store_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                stock_quantity = EXCLUDED.stock_quantity,
                in_stock = EXCLUDED.in_stock,
                store_id = EXCLUDED.store_id,
                store_active = EXCLUDED.store_active,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_i64())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(stock)
        .bind(product.in_stock && stock > 0)
        .bind(product.store_id.as_uuid())
        .bind(product.store_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_price(&self, product_id: ProductId, price: Money) -> Result<()> {
        check_price(product_id, price)?;
        let result =
            sqlx::query("UPDATE products SET price_cents = $2, updated_at = NOW() WHERE id = $1")
                .bind(product_id.as_i64())
                .bind(price.cents())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::ProductNotFound(product_id));
        }
        Ok(())
    }
}
