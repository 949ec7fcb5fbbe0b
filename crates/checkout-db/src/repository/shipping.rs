//! # Shipping Module Repository
//!
//! Shipping modules and the regions they serve.
//!
//! ```text
//! shipping_modules                 shipping_module_regions
//! ┌────┬────────────┬──────────┐   ┌───────────┬─────────┬──────┐
//! │ id │ code       │ position │   │ module_id │ country │ zone │
//! ├────┼────────────┼──────────┤   ├───────────┼─────────┼──────┤
//! │ 1  │ CANADAPOST │ 1        │◄──│ 1         │ CA      │ NULL │
//! │ 2  │ USPS       │ 2        │◄──│ 2         │ US      │ NULL │
//! └────┴────────────┴──────────┘   └───────────┴─────────┴──────┘
//! ```
//!
//! A module and its regions are always written in one transaction.

use std::collections::HashMap;

use checkout_core::validation::validate_shipping_module;
use checkout_core::{ShippingModule, ShippingRegion};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct ModuleRow {
    id: i64,
    code: String,
    priority: i32,
    active: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct RegionRow {
    module_id: i64,
    country_code: String,
    zone_code: Option<String>,
}

/// Repository for shipping module operations.
#[derive(Debug, Clone)]
pub struct ShippingModuleRepository {
    pool: SqlitePool,
}

impl ShippingModuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ShippingModuleRepository { pool }
    }

    /// Inserts a module and its regions at the end of the store's ordering.
    ///
    /// A module must serve at least one region.
    pub async fn insert(&self, store: &str, module: &ShippingModule) -> DbResult<()> {
        validate_shipping_module(module)?;
        debug!(store = %store, code = %module.code, regions = module.regions.len(), "Inserting shipping module");

        let mut tx = self.pool.begin().await?;

        let module_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO shipping_modules (store_code, code, priority, active, position)
            VALUES (
                ?1, ?2, ?3, ?4,
                (SELECT COALESCE(MAX(position), 0) + 1 FROM shipping_modules WHERE store_code = ?1)
            )
            RETURNING id
            "#,
        )
        .bind(store)
        .bind(&module.code)
        .bind(module.priority)
        .bind(module.active)
        .fetch_one(&mut *tx)
        .await?;

        for region in &module.regions {
            sqlx::query(
                "INSERT INTO shipping_module_regions (module_id, country_code, zone_code) VALUES (?1, ?2, ?3)",
            )
            .bind(module_id)
            .bind(&region.country)
            .bind(&region.zone)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Active modules of a store, with regions, in insertion order.
    pub async fn list_active(&self, store: &str) -> DbResult<Vec<ShippingModule>> {
        self.list(store, true).await
    }

    /// Every module of a store, inactive included.
    pub async fn list_all(&self, store: &str) -> DbResult<Vec<ShippingModule>> {
        self.list(store, false).await
    }

    async fn list(&self, store: &str, active_only: bool) -> DbResult<Vec<ShippingModule>> {
        let modules: Vec<ModuleRow> = sqlx::query_as(
            r#"
            SELECT id, code, priority, active
            FROM shipping_modules
            WHERE store_code = ?1 AND (?2 = 0 OR active = 1)
            ORDER BY position
            "#,
        )
        .bind(store)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        let regions: Vec<RegionRow> = sqlx::query_as(
            r#"
            SELECT r.module_id, r.country_code, r.zone_code
            FROM shipping_module_regions r
            JOIN shipping_modules m ON m.id = r.module_id
            WHERE m.store_code = ?1
            ORDER BY r.rowid
            "#,
        )
        .bind(store)
        .fetch_all(&self.pool)
        .await?;

        let mut by_module: HashMap<i64, Vec<ShippingRegion>> = HashMap::new();
        for row in regions {
            by_module.entry(row.module_id).or_default().push(ShippingRegion {
                country: row.country_code,
                zone: row.zone_code,
            });
        }

        Ok(modules
            .into_iter()
            .map(|row| ShippingModule {
                regions: by_module.remove(&row.id).unwrap_or_default(),
                code: row.code,
                priority: row.priority,
                active: row.active,
            })
            .collect())
    }

    pub async fn set_active(&self, store: &str, code: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE shipping_modules SET active = ?3 WHERE store_code = ?1 AND code = ?2",
        )
        .bind(store)
        .bind(code)
        .bind(active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ShippingModule", format!("{store}/{code}")));
        }

        Ok(())
    }

    /// Deletes a module; its regions go with it (ON DELETE CASCADE).
    pub async fn delete(&self, store: &str, code: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM shipping_modules WHERE store_code = ?1 AND code = ?2")
            .bind(store)
            .bind(code)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ShippingModule", format!("{store}/{code}")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};
    use checkout_core::{Delivery, ShippingModule, ShippingRegion, Store};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.stores()
            .insert(&Store {
                code: "DEFAULT".to_string(),
                name: "Default".to_string(),
                currency: "CAD".to_string(),
                default_language: "en".to_string(),
                address: Delivery::new("CA"),
            })
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_modules_round_trip_with_regions() {
        let db = setup().await;
        let repo = db.shipping_modules();

        let canada_post = ShippingModule::new(
            "CANADAPOST",
            1,
            vec![ShippingRegion::country("CA"), ShippingRegion::zone("US", "NY")],
        );
        let usps = ShippingModule::new("USPS", 2, vec![ShippingRegion::country("US")]);
        let retired = ShippingModule::new("PONY", 9, vec![ShippingRegion::country("US")]).inactive();

        repo.insert("DEFAULT", &canada_post).await.unwrap();
        repo.insert("DEFAULT", &usps).await.unwrap();
        repo.insert("DEFAULT", &retired).await.unwrap();

        let active = repo.list_active("DEFAULT").await.unwrap();
        assert_eq!(active, vec![canada_post.clone(), usps]);

        let all = repo.list_all("DEFAULT").await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(!all[2].active);
    }

    #[tokio::test]
    async fn test_deactivate_and_delete() {
        let db = setup().await;
        let repo = db.shipping_modules();
        repo.insert(
            "DEFAULT",
            &ShippingModule::new("USPS", 1, vec![ShippingRegion::country("US")]),
        )
        .await
        .unwrap();

        repo.set_active("DEFAULT", "USPS", false).await.unwrap();
        assert!(repo.list_active("DEFAULT").await.unwrap().is_empty());

        repo.delete("DEFAULT", "USPS").await.unwrap();
        assert!(repo.list_all("DEFAULT").await.unwrap().is_empty());
        assert!(matches!(
            repo.set_active("DEFAULT", "USPS", true).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_module_without_regions_is_rejected() {
        let db = setup().await;
        let repo = db.shipping_modules();

        let err = repo
            .insert("DEFAULT", &ShippingModule::new("USPS", 1, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
        assert!(repo.list_all("DEFAULT").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_nothing_behind() {
        let db = setup().await;
        let repo = db.shipping_modules();
        let module = ShippingModule::new("USPS", 1, vec![ShippingRegion::country("US")]);

        repo.insert("DEFAULT", &module).await.unwrap();
        assert!(repo.insert("DEFAULT", &module).await.is_err());

        let all = repo.list_all("DEFAULT").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].regions.len(), 1);
    }
}
