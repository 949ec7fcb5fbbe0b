//! # Rate Table
//!
//! Read-mostly cache of each store's tax rates and shipping modules.
//!
//! ## Concurrency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cache: RwLock<HashMap<store, Arc<StoreRates>>>                         │
//! │                                                                         │
//! │  compute() ──read──► Arc<StoreRates> (clone the Arc, drop the lock)     │
//! │  compute() ──read──► Arc<StoreRates>                                    │
//! │                                                                         │
//! │  reload()/replace() ──write──► swap in a new Arc<StoreRates>            │
//! │                                                                         │
//! │  A calculation that already holds the old Arc finishes against it;    │
//! │  the next calculation sees the new one.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rates installed with [`RateTable::replace`] are pinned: they are served
//! even when caching is off, until [`RateTable::invalidate`] or
//! [`RateTable::reload`] drops them.
//!
//! ## Errors
//! - Unknown store: [`EngineError::NotFound`]
//! - Any persistence failure: [`EngineError::CalculationFailed`]
//! - No matching rate: an empty list (zero tax), never an error

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use checkout_core::matcher::tax_rate_in_scope;
use checkout_core::{Delivery, ShippingModule, TaxRate};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::RateTableSettings;
use crate::error::{EngineError, EngineResult};
use crate::source::RateSource;

/// Everything the pipeline needs from one store's configuration.
#[derive(Debug, Clone)]
pub struct StoreRates {
    pub tax_rates: Vec<TaxRate>,
    pub shipping_modules: Vec<ShippingModule>,
    pub loaded_at: DateTime<Utc>,
}

impl StoreRates {
    pub fn new(tax_rates: Vec<TaxRate>, shipping_modules: Vec<ShippingModule>) -> Self {
        StoreRates {
            tax_rates,
            shipping_modules,
            loaded_at: Utc::now(),
        }
    }
}

pub struct RateTable {
    source: Arc<dyn RateSource>,
    cache: RwLock<HashMap<String, Arc<StoreRates>>>,
    pinned: RwLock<HashMap<String, Arc<StoreRates>>>,
    cache_enabled: bool,
}

impl std::fmt::Debug for RateTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateTable")
            .field("cache_enabled", &self.cache_enabled)
            .finish_non_exhaustive()
    }
}

impl RateTable {
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        RateTable {
            source,
            cache: RwLock::new(HashMap::new()),
            pinned: RwLock::new(HashMap::new()),
            cache_enabled: true,
        }
    }

    /// Builds a table honoring `[rate_table]` settings.
    pub fn from_settings(source: Arc<dyn RateSource>, settings: &RateTableSettings) -> Self {
        Self::new(source).with_cache(settings.cache_enabled)
    }

    /// With caching off every lookup goes to the source.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Returns the store's current rates, loading them on first use.
    pub async fn snapshot(&self, store: &str) -> EngineResult<Arc<StoreRates>> {
        if let Some(rates) = self.pinned.read().await.get(store) {
            return Ok(Arc::clone(rates));
        }

        if self.cache_enabled {
            if let Some(rates) = self.cache.read().await.get(store) {
                return Ok(Arc::clone(rates));
            }
        }

        let rates = Arc::new(self.load(store).await?);
        if self.cache_enabled {
            self.cache
                .write()
                .await
                .insert(store.to_string(), Arc::clone(&rates));
        }
        Ok(rates)
    }

    /// Active tax rates whose country, zone and language scope admit the
    /// delivery, ordered by priority (stable by configured position).
    pub async fn find_tax_rates(
        &self,
        store: &str,
        delivery: &Delivery,
        language: Option<&str>,
    ) -> EngineResult<Vec<TaxRate>> {
        let rates = self.snapshot(store).await?;

        let mut matching: Vec<TaxRate> = rates
            .tax_rates
            .iter()
            .filter(|rate| tax_rate_in_scope(rate, delivery, language))
            .cloned()
            .collect();
        matching.sort_by_key(|rate| rate.priority);

        debug!(
            store = %store,
            country = %delivery.country,
            zone = ?delivery.region(),
            language = ?language,
            found = matching.len(),
            "Found tax rates"
        );
        Ok(matching)
    }

    /// All of the store's shipping modules in configured order.
    pub async fn find_shipping_modules(&self, store: &str) -> EngineResult<Vec<ShippingModule>> {
        Ok(self.snapshot(store).await?.shipping_modules.clone())
    }

    /// Drops a store's cached and pinned rates; the next lookup reloads them.
    pub async fn invalidate(&self, store: &str) {
        let pinned = self.pinned.write().await.remove(store).is_some();
        let cached = self.cache.write().await.remove(store).is_some();
        if pinned || cached {
            debug!(store = %store, "Invalidated cached rates");
        }
    }

    pub async fn invalidate_all(&self) {
        self.pinned.write().await.clear();
        self.cache.write().await.clear();
    }

    /// Loads fresh rates from the source and swaps them in, replacing any
    /// pinned rates.
    pub async fn reload(&self, store: &str) -> EngineResult<Arc<StoreRates>> {
        let rates = Arc::new(self.load(store).await?);
        if self.cache_enabled {
            self.cache
                .write()
                .await
                .insert(store.to_string(), Arc::clone(&rates));
        }
        self.pinned.write().await.remove(store);
        info!(
            store = %store,
            tax_rates = rates.tax_rates.len(),
            shipping_modules = rates.shipping_modules.len(),
            "Reloaded store rates"
        );
        Ok(rates)
    }

    /// Pins rates for a store (administrative update). Served whether or not
    /// caching is enabled.
    pub async fn replace(&self, store: &str, rates: StoreRates) {
        info!(
            store = %store,
            tax_rates = rates.tax_rates.len(),
            shipping_modules = rates.shipping_modules.len(),
            "Replaced store rates"
        );
        self.pinned
            .write()
            .await
            .insert(store.to_string(), Arc::new(rates));
    }

    /// Codes of the stores held in memory (cached or pinned), sorted.
    pub async fn cached_stores(&self) -> Vec<String> {
        let mut stores: Vec<String> = self.cache.read().await.keys().cloned().collect();
        for store in self.pinned.read().await.keys() {
            if !stores.contains(store) {
                stores.push(store.clone());
            }
        }
        stores.sort();
        stores
    }

    async fn load(&self, store: &str) -> EngineResult<StoreRates> {
        let exists = self
            .source
            .store_exists(store)
            .await
            .map_err(|e| EngineError::from_db("load_store", e))?;
        if !exists {
            return Err(EngineError::not_found("Store", store));
        }

        let tax_rates = self
            .source
            .load_tax_rates(store)
            .await
            .map_err(|e| EngineError::from_db("load_tax_rates", e))?;
        let shipping_modules = self
            .source
            .load_shipping_modules(store)
            .await
            .map_err(|e| EngineError::from_db("load_shipping_modules", e))?;

        debug!(
            store = %store,
            tax_rates = tax_rates.len(),
            shipping_modules = shipping_modules.len(),
            "Loaded store rates"
        );
        Ok(StoreRates::new(tax_rates, shipping_modules))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use checkout_core::{RatePercent, ShippingRegion};
    use checkout_db::{DbError, DbResult};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory [`RateSource`] that counts loads and can be told to fail.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub stores: Vec<String>,
        pub tax_rates: Vec<TaxRate>,
        pub modules: Vec<ShippingModule>,
        pub fail_tax_rates: bool,
        pub loads: AtomicUsize,
    }

    #[async_trait]
    impl RateSource for FakeSource {
        async fn store_exists(&self, store: &str) -> DbResult<bool> {
            Ok(self.stores.iter().any(|s| s == store))
        }

        async fn load_tax_rates(&self, store: &str) -> DbResult<Vec<TaxRate>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_tax_rates {
                return Err(DbError::ConnectionFailed("database is locked".to_string()));
            }
            Ok(self
                .tax_rates
                .iter()
                .filter(|r| r.store == store && r.active)
                .cloned()
                .collect())
        }

        async fn load_shipping_modules(&self, _store: &str) -> DbResult<Vec<ShippingModule>> {
            Ok(self.modules.iter().filter(|m| m.active).cloned().collect())
        }
    }

    /// DEFAULT store with GST (CA), QST (CA/QC) and a French-only CA rate.
    pub(crate) fn canadian_source() -> FakeSource {
        FakeSource {
            stores: vec!["DEFAULT".to_string()],
            tax_rates: vec![
                TaxRate::new("DEFAULT", "QST", "CA", RatePercent::new(dec!(9.975)).unwrap(), 2)
                    .in_zone("QC")
                    .with_parent("GST"),
                TaxRate::new("DEFAULT", "GST", "CA", RatePercent::new(dec!(5)).unwrap(), 1),
                TaxRate::new("DEFAULT", "ECO", "CA", RatePercent::new(dec!(1)).unwrap(), 3)
                    .for_language("fr"),
                TaxRate::new("DEFAULT", "OLD", "CA", RatePercent::new(dec!(7)).unwrap(), 1)
                    .inactive(),
            ],
            modules: vec![ShippingModule::new(
                "CANADAPOST",
                1,
                vec![ShippingRegion::country("CA")],
            )],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_find_tax_rates_orders_by_priority() {
        let table = RateTable::new(Arc::new(canadian_source()));
        let qc = Delivery::new("CA").with_zone("QC");

        let rates = table.find_tax_rates("DEFAULT", &qc, Some("en")).await.unwrap();
        let codes: Vec<_> = rates.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["GST", "QST"]);

        let rates = table.find_tax_rates("DEFAULT", &qc, Some("fr")).await.unwrap();
        let codes: Vec<_> = rates.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["GST", "QST", "ECO"]);
    }

    #[tokio::test]
    async fn test_no_matching_rate_is_empty_not_error() {
        let table = RateTable::new(Arc::new(canadian_source()));
        let rates = table
            .find_tax_rates("DEFAULT", &Delivery::new("FR"), None)
            .await
            .unwrap();
        assert!(rates.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_store_is_not_found() {
        let table = RateTable::new(Arc::new(canadian_source()));
        let err = table.find_shipping_modules("NOPE").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { ref id, .. } if id == "NOPE"));
    }

    #[tokio::test]
    async fn test_source_failure_is_calculation_failed() {
        let source = FakeSource {
            fail_tax_rates: true,
            ..canadian_source()
        };
        let table = RateTable::new(Arc::new(source));

        let err = table
            .find_tax_rates("DEFAULT", &Delivery::new("CA"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CalculationFailed { ref stage, .. } if stage == "load_tax_rates"));
    }

    #[tokio::test]
    async fn test_cache_and_invalidate() {
        let source = Arc::new(canadian_source());
        let table = RateTable::new(source.clone());

        table.snapshot("DEFAULT").await.unwrap();
        table.snapshot("DEFAULT").await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(table.cached_stores().await, vec!["DEFAULT".to_string()]);

        table.invalidate("DEFAULT").await;
        assert!(table.cached_stores().await.is_empty());
        table.snapshot("DEFAULT").await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_loads() {
        let source = Arc::new(canadian_source());
        let table = RateTable::new(source.clone()).with_cache(false);

        table.snapshot("DEFAULT").await.unwrap();
        table.snapshot("DEFAULT").await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
        assert!(table.cached_stores().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_keeps_held_snapshot() {
        let table = RateTable::new(Arc::new(canadian_source()));
        let before = table.snapshot("DEFAULT").await.unwrap();

        table
            .replace("DEFAULT", StoreRates::new(Vec::new(), Vec::new()))
            .await;

        assert_eq!(before.tax_rates.len(), 3);
        let after = table.snapshot("DEFAULT").await.unwrap();
        assert!(after.tax_rates.is_empty());

        let reloaded = table.reload("DEFAULT").await.unwrap();
        assert_eq!(reloaded.tax_rates.len(), 3);
    }

    #[tokio::test]
    async fn test_replace_applies_with_cache_disabled() {
        let source = Arc::new(canadian_source());
        let table = RateTable::new(source.clone()).with_cache(false);

        table
            .replace("DEFAULT", StoreRates::new(Vec::new(), Vec::new()))
            .await;
        let pinned = table.snapshot("DEFAULT").await.unwrap();
        assert!(pinned.tax_rates.is_empty());
        assert_eq!(source.loads.load(Ordering::SeqCst), 0);
        assert_eq!(table.cached_stores().await, vec!["DEFAULT".to_string()]);

        table.invalidate("DEFAULT").await;
        assert_eq!(table.snapshot("DEFAULT").await.unwrap().tax_rates.len(), 3);
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_from_settings_honors_cache_flag() {
        let source = Arc::new(canadian_source());
        let settings = RateTableSettings {
            cache_enabled: false,
        };
        let table = RateTable::from_settings(source.clone(), &settings);

        table.snapshot("DEFAULT").await.unwrap();
        table.snapshot("DEFAULT").await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_see_whole_snapshots_during_updates() {
        let table = Arc::new(RateTable::new(Arc::new(canadian_source())));
        let qc = Delivery::new("CA").with_zone("QC");
        table.snapshot("DEFAULT").await.unwrap();

        // Old snapshot: GST + QST. New snapshot: a single HST-style rate.
        let replacement = || {
            StoreRates::new(
                vec![TaxRate::new("DEFAULT", "HST", "CA", RatePercent::new(dec!(15)).unwrap(), 1)],
                Vec::new(),
            )
        };

        let mut readers = Vec::new();
        for _ in 0..8 {
            let table = Arc::clone(&table);
            let qc = qc.clone();
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..200 {
                    let rates = table.find_tax_rates("DEFAULT", &qc, Some("en")).await.unwrap();
                    seen.push(rates.iter().map(|r| r.code.clone()).collect::<Vec<_>>());
                    tokio::task::yield_now().await;
                }
                seen
            }));
        }

        let writer = {
            let table = Arc::clone(&table);
            tokio::spawn(async move {
                for _ in 0..50 {
                    table.replace("DEFAULT", replacement()).await;
                    tokio::task::yield_now().await;
                    table.reload("DEFAULT").await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        let old = vec!["GST".to_string(), "QST".to_string()];
        let new = vec!["HST".to_string()];
        for reader in readers {
            for codes in reader.await.unwrap() {
                assert!(codes == old || codes == new, "torn snapshot: {codes:?}");
            }
        }
    }
}
