//! # Rate Source
//!
//! Where the [`RateTable`](crate::rate_table::RateTable) loads configuration
//! from. Production uses the SQLite [`Database`]; tests plug in fakes.

use async_trait::async_trait;
use checkout_core::{ShippingModule, TaxRate};
use checkout_db::{Database, DbResult};

/// Persistent rate configuration, read per store.
///
/// Returned lists are in configured (insertion) order and contain active
/// entries only.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn store_exists(&self, store: &str) -> DbResult<bool>;

    async fn load_tax_rates(&self, store: &str) -> DbResult<Vec<TaxRate>>;

    async fn load_shipping_modules(&self, store: &str) -> DbResult<Vec<ShippingModule>>;
}

#[async_trait]
impl RateSource for Database {
    async fn store_exists(&self, store: &str) -> DbResult<bool> {
        self.stores().exists(store).await
    }

    async fn load_tax_rates(&self, store: &str) -> DbResult<Vec<TaxRate>> {
        self.tax_rates().list_active(store).await
    }

    async fn load_shipping_modules(&self, store: &str) -> DbResult<Vec<ShippingModule>> {
        self.shipping_modules().list_active(store).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use checkout_core::{Cart, Customer, Delivery, LineItem, Money, RatePercent, ShippingRegion, Store};
    use checkout_db::DbConfig;
    use rust_decimal_macros::dec;

    use crate::config::{EngineConfig, FlatRateSettings};
    use crate::pipeline::OrderTotalPipeline;
    use crate::rate_table::RateTable;

    async fn seeded_db() -> Arc<Database> {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.stores()
            .insert(&Store {
                code: "DEFAULT".to_string(),
                name: "Montreal Books".to_string(),
                currency: "CAD".to_string(),
                default_language: "en".to_string(),
                address: Delivery::new("CA").with_zone("QC"),
            })
            .await
            .unwrap();

        let rates = db.tax_rates();
        rates
            .insert(&TaxRate::new("DEFAULT", "GST", "CA", RatePercent::new(dec!(5)).unwrap(), 1))
            .await
            .unwrap();
        rates
            .insert(
                &TaxRate::new("DEFAULT", "QST", "CA", RatePercent::new(dec!(9.975)).unwrap(), 2)
                    .in_zone("QC")
                    .with_parent("GST"),
            )
            .await
            .unwrap();

        db.shipping_modules()
            .insert(
                "DEFAULT",
                &ShippingModule::new("CANADAPOST", 1, vec![ShippingRegion::country("CA")]),
            )
            .await
            .unwrap();

        Arc::new(db)
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.shipping.flat_rates.insert(
            "CANADAPOST".to_string(),
            FlatRateSettings {
                base_cents: 995,
                per_item_cents: 0,
                free_over_cents: Some(5_000),
            },
        );
        config
    }

    #[tokio::test]
    async fn test_database_source_loads_active_entries() {
        let db = seeded_db().await;
        db.tax_rates().set_active("DEFAULT", "QST", false).await.unwrap();

        assert!(db.store_exists("DEFAULT").await.unwrap());
        assert!(!db.store_exists("OUTLET").await.unwrap());

        let rates = db.load_tax_rates("DEFAULT").await.unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].code, "GST");

        let modules = db.load_shipping_modules("DEFAULT").await.unwrap();
        assert_eq!(modules[0].code, "CANADAPOST");
    }

    #[tokio::test]
    async fn test_quote_and_store_order_end_to_end() {
        let db = seeded_db().await;
        let pipeline = OrderTotalPipeline::new(Arc::new(RateTable::new(db.clone())), config());
        let store = db.stores().get("DEFAULT").await.unwrap().unwrap();

        let cart = Cart::new()
            .with_item(LineItem::new("BOOK-1", "Book", Money::from_cents(10_000), 1))
            .unwrap();
        let delivery = Delivery::new("CA").with_zone("QC");

        let summary = pipeline
            .compute(&cart, &delivery, &Customer::new("c1"), &store)
            .await
            .unwrap();
        // Declared value is over the free-shipping threshold.
        assert_eq!(summary.find("CANADAPOST").unwrap().value.cents(), 0);
        assert_eq!(summary.grand_total().cents(), 11_498);

        let id = db.orders().insert(&summary).await.unwrap();

        // Later rate edits do not touch the stored order.
        db.tax_rates()
            .update_rate("DEFAULT", "GST", RatePercent::new(dec!(6)).unwrap())
            .await
            .unwrap();
        pipeline.rate_table().reload("DEFAULT").await.unwrap();

        let stored = db.orders().get(&id).await.unwrap().unwrap();
        assert_eq!(stored.summary.grand_total().cents(), 11_498);
        assert_eq!(stored.summary.find("GST").unwrap().rate, Some(RatePercent::from_bps(500)));

        let requote = pipeline
            .compute(&cart, &delivery, &Customer::new("c1"), &store)
            .await
            .unwrap();
        assert_eq!(requote.find("GST").unwrap().value.cents(), 600);
    }
}
