//! # Tax Rate Repository
//!
//! Persistent tax rate configuration, one row per (store, code).
//!
//! ## Ordering
//! Every row carries a `position` assigned at insert time. All list queries
//! return rows in `position` order, which is the "first inserted wins"
//! tie-break the matcher relies on. Updating a rate keeps its position.

use checkout_core::validation::{validate_rate_percent, validate_tax_rate};
use checkout_core::{RatePercent, TaxRate};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::{format_rate, parse_rate};

#[derive(Debug, sqlx::FromRow)]
struct TaxRateRow {
    store_code: String,
    code: String,
    country_code: String,
    zone_code: Option<String>,
    language: Option<String>,
    rate: String,
    priority: i32,
    parent_code: Option<String>,
    compound: bool,
    active: bool,
}

impl TryFrom<TaxRateRow> for TaxRate {
    type Error = DbError;

    fn try_from(row: TaxRateRow) -> Result<Self, Self::Error> {
        let rate = parse_rate("TaxRate", &row.code, &row.rate)?;

        Ok(TaxRate {
            store: row.store_code,
            code: row.code,
            country: row.country_code,
            zone: row.zone_code,
            language: row.language,
            rate,
            priority: row.priority,
            parent: row.parent_code,
            compound: row.compound,
            active: row.active,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT store_code, code, country_code, zone_code, language,
           rate, priority, parent_code, compound, active
    FROM tax_rates
"#;

/// Repository for tax rate operations.
#[derive(Debug, Clone)]
pub struct TaxRateRepository {
    pool: SqlitePool,
}

impl TaxRateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TaxRateRepository { pool }
    }

    /// Inserts a rate at the end of its store's ordering.
    ///
    /// ## Errors
    /// - `Validation` if the rate is malformed (bad code, self-parented)
    /// - `UniqueViolation` if the store already has a rate with this code
    /// - `ForeignKeyViolation` if the store does not exist
    pub async fn insert(&self, rate: &TaxRate) -> DbResult<()> {
        validate_tax_rate(rate)?;
        debug!(store = %rate.store, code = %rate.code, rate = %rate.rate, "Inserting tax rate");

        sqlx::query(
            r#"
            INSERT INTO tax_rates (
                store_code, code, country_code, zone_code, language,
                rate, priority, parent_code, compound, active, position
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                (SELECT COALESCE(MAX(position), 0) + 1 FROM tax_rates WHERE store_code = ?1)
            )
            "#,
        )
        .bind(&rate.store)
        .bind(&rate.code)
        .bind(&rate.country)
        .bind(&rate.zone)
        .bind(&rate.language)
        .bind(format_rate(rate.rate))
        .bind(rate.priority)
        .bind(&rate.parent)
        .bind(rate.compound)
        .bind(rate.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets one rate by store and code (active or not).
    pub async fn get(&self, store: &str, code: &str) -> DbResult<Option<TaxRate>> {
        let row: Option<TaxRateRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE store_code = ?1 AND code = ?2"))
                .bind(store)
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TaxRate::try_from).transpose()
    }

    /// Active rates of a store in insertion order. This is what the rate
    /// table caches.
    pub async fn list_active(&self, store: &str) -> DbResult<Vec<TaxRate>> {
        let rows: Vec<TaxRateRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE store_code = ?1 AND active = 1 ORDER BY position"
        ))
        .bind(store)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaxRate::try_from).collect()
    }

    /// Every rate of a store, inactive included, in insertion order.
    pub async fn list_all(&self, store: &str) -> DbResult<Vec<TaxRate>> {
        let rows: Vec<TaxRateRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE store_code = ?1 ORDER BY position"))
                .bind(store)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TaxRate::try_from).collect()
    }

    /// Active rates of a store for one country (case-insensitive).
    pub async fn list_for_country(&self, store: &str, country: &str) -> DbResult<Vec<TaxRate>> {
        let rows: Vec<TaxRateRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE store_code = ?1 AND UPPER(country_code) = UPPER(?2) \
             AND active = 1 ORDER BY position"
        ))
        .bind(store)
        .bind(country)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaxRate::try_from).collect()
    }

    /// Changes a rate's percentage in place.
    ///
    /// Orders already persisted keep the percentage they were computed with.
    pub async fn update_rate(&self, store: &str, code: &str, rate: RatePercent) -> DbResult<()> {
        validate_rate_percent(rate.value())?;
        info!(store = %store, code = %code, rate = %rate, "Updating tax rate");

        let result = sqlx::query("UPDATE tax_rates SET rate = ?3 WHERE store_code = ?1 AND code = ?2")
            .bind(store)
            .bind(code)
            .bind(format_rate(rate))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxRate", format!("{store}/{code}")));
        }

        Ok(())
    }

    pub async fn set_active(&self, store: &str, code: &str, active: bool) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE tax_rates SET active = ?3 WHERE store_code = ?1 AND code = ?2")
                .bind(store)
                .bind(code)
                .bind(active)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxRate", format!("{store}/{code}")));
        }

        Ok(())
    }

    pub async fn delete(&self, store: &str, code: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM tax_rates WHERE store_code = ?1 AND code = ?2")
            .bind(store)
            .bind(code)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxRate", format!("{store}/{code}")));
        }

        Ok(())
    }
}
