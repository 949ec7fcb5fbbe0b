//! # Order Repository
//!
//! Persists finalized [`OrderSummary`] snapshots.
//!
//! ## Snapshot Pattern
//! Line prices, adjustment labels and the tax percentages are copied into
//! `order_lines` / `order_totals`. Editing or deleting a tax rate later never
//! changes what a stored order says it was charged.
//!
//! ```text
//! OrderSummary ──insert()──► BEGIN
//!                              ├── orders        (1 row)
//!                              ├── order_lines   (n rows, position order)
//!                              └── order_totals  (m rows, position order)
//!                            COMMIT
//! ```

use checkout_core::{
    LineItem, Money, OrderSummary, OrderTotal, OrderTotalKind, SummaryParts,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{format_rate, parse_rate};

/// An order summary as stored, with its generated ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOrder {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub summary: OrderSummary,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    store_code: String,
    customer_id: String,
    currency: String,
    language: String,
    shipping_module: Option<String>,
    subtotal_cents: i64,
    grand_total_cents: i64,
    computed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    sku: String,
    name: String,
    unit_price_cents: i64,
    quantity: i64,
    taxable: bool,
    weight_grams: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct TotalRow {
    kind: OrderTotalKind,
    code: String,
    label: String,
    value_cents: i64,
    rate: Option<String>,
}

/// Repository for order snapshots.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Stores a finalized summary and returns its new order ID.
    pub async fn insert(&self, summary: &OrderSummary) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!(
            id = %id,
            store = %summary.store_code(),
            grand_total = summary.grand_total().cents(),
            "Inserting order"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, store_code, customer_id, currency, language, shipping_module,
                subtotal_cents, grand_total_cents, computed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&id)
        .bind(summary.store_code())
        .bind(summary.customer_id())
        .bind(summary.currency())
        .bind(summary.language())
        .bind(summary.shipping_module())
        .bind(summary.subtotal().cents())
        .bind(summary.grand_total().cents())
        .bind(summary.computed_at())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (position, line) in summary.lines().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    order_id, position, sku, name, unit_price_cents, quantity, taxable, weight_grams
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&id)
            .bind(position as i64)
            .bind(&line.sku)
            .bind(&line.name)
            .bind(line.unit_price.cents())
            .bind(line.quantity)
            .bind(line.taxable)
            .bind(i64::from(line.weight_grams))
            .execute(&mut *tx)
            .await?;
        }

        for (position, total) in summary.totals().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_totals (
                    order_id, position, kind, code, label, value_cents, rate
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&id)
            .bind(position as i64)
            .bind(total.kind)
            .bind(&total.code)
            .bind(&total.label)
            .bind(total.value.cents())
            .bind(total.rate.map(format_rate))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(id = %id, totals = summary.totals().len(), "Order stored");
        Ok(id)
    }

    /// Loads a stored order.
    ///
    /// The grand total is recomputed from the stored lines and totals; a
    /// mismatch with the stored value is reported as a corrupt record.
    pub async fn get(&self, id: &str) -> DbResult<Option<StoredOrder>> {
        let header: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, store_code, customer_id, currency, language, shipping_module,
                   subtotal_cents, grand_total_cents, computed_at, created_at
            FROM orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match header {
            Some(row) => self.assemble(row).await.map(Some),
            None => Ok(None),
        }
    }

    /// Most recent orders of one customer in one store, newest first.
    pub async fn list_for_customer(
        &self,
        store: &str,
        customer_id: &str,
        limit: u32,
    ) -> DbResult<Vec<StoredOrder>> {
        let headers: Vec<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, store_code, customer_id, currency, language, shipping_module,
                   subtotal_cents, grand_total_cents, computed_at, created_at
            FROM orders
            WHERE store_code = ?1 AND customer_id = ?2
            ORDER BY created_at DESC, id
            LIMIT ?3
            "#,
        )
        .bind(store)
        .bind(customer_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(headers.len());
        for row in headers {
            orders.push(self.assemble(row).await?);
        }
        Ok(orders)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn assemble(&self, row: OrderRow) -> DbResult<StoredOrder> {
        let lines: Vec<LineRow> = sqlx::query_as(
            r#"
            SELECT sku, name, unit_price_cents, quantity, taxable, weight_grams
            FROM order_lines
            WHERE order_id = ?1
            ORDER BY position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let totals: Vec<TotalRow> = sqlx::query_as(
            r#"
            SELECT kind, code, label, value_cents, rate
            FROM order_totals
            WHERE order_id = ?1
            ORDER BY position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let lines = lines
            .into_iter()
            .map(|l| -> DbResult<LineItem> {
                let weight_grams = u32::try_from(l.weight_grams)
                    .map_err(|e| DbError::corrupt("Order", &row.id, e))?;
                Ok(LineItem {
                    sku: l.sku,
                    name: l.name,
                    unit_price: Money::from_cents(l.unit_price_cents),
                    quantity: l.quantity,
                    taxable: l.taxable,
                    weight_grams,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        let totals = totals
            .into_iter()
            .map(|t| -> DbResult<OrderTotal> {
                let rate = t
                    .rate
                    .as_deref()
                    .map(|raw| parse_rate("Order", &row.id, raw))
                    .transpose()?;
                Ok(OrderTotal {
                    kind: t.kind,
                    code: t.code,
                    label: t.label,
                    value: Money::from_cents(t.value_cents),
                    rate,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        let summary = OrderSummary::new(SummaryParts {
            store_code: row.store_code,
            customer_id: row.customer_id,
            currency: row.currency,
            language: row.language,
            lines,
            subtotal: Money::from_cents(row.subtotal_cents),
            totals,
            shipping_module: row.shipping_module,
            computed_at: row.computed_at,
        });

        if summary.grand_total().cents() != row.grand_total_cents {
            return Err(DbError::corrupt(
                "Order",
                &row.id,
                format!(
                    "stored grand total {} does not match computed {}",
                    Money::from_cents(row.grand_total_cents),
                    summary.grand_total()
                ),
            ));
        }

        Ok(StoredOrder {
            id: row.id,
            created_at: row.created_at,
            summary,
        })
    }
}
