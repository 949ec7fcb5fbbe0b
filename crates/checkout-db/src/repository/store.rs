//! # Store Repository
//!
//! Stores are the root of all rate configuration: every tax rate and shipping
//! module belongs to exactly one store code.

use checkout_core::{Delivery, Store};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    code: String,
    name: String,
    currency: String,
    default_language: String,
    country_code: String,
    zone_code: Option<String>,
    province: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    address_lines: String,
}

impl TryFrom<StoreRow> for Store {
    type Error = DbError;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        let address_lines: Vec<String> = serde_json::from_str(&row.address_lines)
            .map_err(|e| DbError::corrupt("Store", &row.code, e))?;

        Ok(Store {
            code: row.code,
            name: row.name,
            currency: row.currency,
            default_language: row.default_language,
            address: Delivery {
                country: row.country_code,
                zone: row.zone_code,
                province: row.province,
                city: row.city,
                postal_code: row.postal_code,
                address_lines,
            },
        })
    }
}

/// Repository for store operations.
#[derive(Debug, Clone)]
pub struct StoreRepository {
    pool: SqlitePool,
}

impl StoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StoreRepository { pool }
    }

    /// Inserts a store. Fails with `UniqueViolation` if the code exists.
    pub async fn insert(&self, store: &Store) -> DbResult<()> {
        debug!(code = %store.code, "Inserting store");

        let address_lines = serde_json::to_string(&store.address.address_lines)
            .map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO stores (
                code, name, currency, default_language,
                country_code, zone_code, province, city, postal_code, address_lines
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&store.code)
        .bind(&store.name)
        .bind(&store.currency)
        .bind(&store.default_language)
        .bind(&store.address.country)
        .bind(&store.address.zone)
        .bind(&store.address.province)
        .bind(&store.address.city)
        .bind(&store.address.postal_code)
        .bind(address_lines)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a store by code.
    pub async fn get(&self, code: &str) -> DbResult<Option<Store>> {
        let row: Option<StoreRow> = sqlx::query_as(
            r#"
            SELECT code, name, currency, default_language,
                   country_code, zone_code, province, city, postal_code, address_lines
            FROM stores
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Store::try_from).transpose()
    }

    pub async fn exists(&self, code: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stores WHERE code = ?1")
            .bind(code)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    /// All store codes, sorted.
    pub async fn list_codes(&self) -> DbResult<Vec<String>> {
        let codes: Vec<String> = sqlx::query_scalar("SELECT code FROM stores ORDER BY code")
            .fetch_all(&self.pool)
            .await?;

        Ok(codes)
    }
}
