//! # Order Total Pipeline
//!
//! Turns a cart plus its context into a finalized [`OrderSummary`].
//!
//! ## Stages
//! ```text
//! ┌──────────┐   rates + module   ┌───────────────┐
//! │ Started  │──────────────────►│ RatesResolved │
//! └──────────┘                    └───────┬───────┘
//!                                         │ subtotal, post-processors,
//!                                         │ shipping quote, taxes
//!                                         ▼
//! ┌───────────┐   OrderSummary   ┌────────────────────┐
//! │ Finalized │◄─────────────────│ AdjustmentsApplied │
//! └───────────┘                  └────────────────────┘
//! ```
//!
//! Any other transition is an internal error. Nothing is returned until the
//! summary is finalized: a failure at any stage discards every partial total.
//!
//! ## Tax Base
//! ```text
//! taxable subtotal
//!   + discounts (negative)
//!   + shipping            (only when the store taxes shipping)
//!   ─────────────────
//!   clamped at 0, then each selected rate rounds once, half-up
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use checkout_core::accumulator::{
    apply_shipping_cost, apply_taxes, checked_magnitude, TotalAccumulator,
};
use checkout_core::matcher::{select_shipping_module, select_tax_rates};
use checkout_core::validation::{validate_cart, validate_delivery};
use checkout_core::{
    Cart, CoreError, CoreResult, Customer, Delivery, Money, OrderSummary, OrderTotalKind,
    ShippingModule, Store, SummaryParts,
};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::post_processor::{OrderTotalPostProcessor, PostProcessContext, PostProcessorRegistry};
use crate::quote::{QuoterRegistry, ShippingQuoter};
use crate::rate_table::RateTable;
use crate::source::RateSource;

// =============================================================================
// Stage
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Started,
    RatesResolved,
    AdjustmentsApplied,
    Finalized,
}

impl Stage {
    /// The only stage reachable from this one.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Started => Some(Stage::RatesResolved),
            Stage::RatesResolved => Some(Stage::AdjustmentsApplied),
            Stage::AdjustmentsApplied => Some(Stage::Finalized),
            Stage::Finalized => None,
        }
    }

    pub fn advance(self, to: Stage) -> CoreResult<Stage> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(CoreError::InvalidStageTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Started => "started",
            Stage::RatesResolved => "rates_resolved",
            Stage::AdjustmentsApplied => "adjustments_applied",
            Stage::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// The calculation entry point. Cheap to share behind an `Arc`; every call to
/// [`compute`](Self::compute) is independent.
#[derive(Debug)]
pub struct OrderTotalPipeline {
    rates: Arc<RateTable>,
    quoters: QuoterRegistry,
    post_processors: PostProcessorRegistry,
    config: EngineConfig,
}

impl OrderTotalPipeline {
    /// Builds a pipeline with the quoters and discounts declared in `config`.
    pub fn new(rates: Arc<RateTable>, config: EngineConfig) -> Self {
        OrderTotalPipeline {
            rates,
            quoters: QuoterRegistry::from_settings(&config.shipping),
            post_processors: PostProcessorRegistry::from_settings(&config.discounts),
            config,
        }
    }

    /// Builds the rate table from `config.rate_table`, then the pipeline.
    pub fn from_source(source: Arc<dyn RateSource>, config: EngineConfig) -> Self {
        let rates = RateTable::from_settings(source, &config.rate_table);
        Self::new(Arc::new(rates), config)
    }

    /// Registers a quoter for a shipping module code.
    pub fn with_quoter(mut self, module_code: impl Into<String>, quoter: Arc<dyn ShippingQuoter>) -> Self {
        self.quoters.register(module_code, quoter);
        self
    }

    /// Registers a post-processor; stores opt in by listing its name.
    pub fn with_post_processor(mut self, processor: Arc<dyn OrderTotalPostProcessor>) -> Self {
        self.post_processors.register(processor);
        self
    }

    pub fn rate_table(&self) -> &Arc<RateTable> {
        &self.rates
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Computes the order totals with a freshly selected shipping module.
    pub async fn compute(
        &self,
        cart: &Cart,
        delivery: &Delivery,
        customer: &Customer,
        store: &Store,
    ) -> EngineResult<OrderSummary> {
        self.compute_with_module(cart, delivery, customer, store, None)
            .await
    }

    /// Like [`compute`](Self::compute), keeping `current_module` when it still
    /// serves the delivery.
    pub async fn compute_with_module(
        &self,
        cart: &Cart,
        delivery: &Delivery,
        customer: &Customer,
        store: &Store,
        current_module: Option<&str>,
    ) -> EngineResult<OrderSummary> {
        validate_delivery(delivery)?;
        validate_cart(cart)?;

        let policy = self.config.policy_for(&store.code);
        let processors = self.post_processors.resolve(&policy.post_processors)?;
        let language = self.language_for(customer, store);
        let mut stage = Stage::Started;

        // ---------------------------------------------------------------------
        // Resolve rates and module
        // ---------------------------------------------------------------------

        let tax_address = policy.tax_basis.resolve(delivery, customer, store);
        let candidates = self
            .rates
            .find_tax_rates(&store.code, tax_address, Some(language))
            .await?;
        let tax_rates = select_tax_rates(tax_address, &candidates);

        let modules = self.rates.find_shipping_modules(&store.code).await?;
        let module = select_shipping_module(delivery, &modules, current_module)?;

        stage = stage.advance(Stage::RatesResolved)?;
        debug!(
            store = %store.code,
            stage = %stage,
            tax_basis = ?policy.tax_basis,
            tax_rates = ?tax_rates.iter().map(|r| r.code.as_str()).collect::<Vec<_>>(),
            module = ?module.map(|m| m.code.as_str()),
            "Rates resolved"
        );

        // ---------------------------------------------------------------------
        // Adjustments
        // ---------------------------------------------------------------------

        let subtotal = cart.subtotal();
        let mut totals = TotalAccumulator::new();

        for processor in &processors {
            let ctx = PostProcessContext {
                store,
                customer,
                delivery,
                cart,
                subtotal,
                totals: totals.totals(),
            };
            let produced = processor.process(&ctx).await.map_err(|e| {
                warn!(processor = %processor.name(), error = %e, "Post-processor failed");
                EngineError::calculation_failed(format!("post_processor {}", processor.name()), e)
            })?;
            totals.extend(produced);
            ensure_in_range(format!("post_processor {}", processor.name()), subtotal, &totals)?;
        }

        if let Some(module) = module {
            totals.push(self.quote_shipping(module, cart, delivery).await?);
            ensure_in_range(format!("shipping_quote {}", module.code), subtotal, &totals)?;
        }

        let mut tax_base = cart.taxable_subtotal() + totals.sum_of(OrderTotalKind::Discount);
        if policy.tax_on_shipping {
            tax_base += totals.sum_of(OrderTotalKind::Shipping);
        }
        totals.extend(apply_taxes(&tax_rates, tax_base.non_negative()));

        stage = stage.advance(Stage::AdjustmentsApplied)?;

        // ---------------------------------------------------------------------
        // Finalize
        // ---------------------------------------------------------------------

        let summary = OrderSummary::new(SummaryParts {
            store_code: store.code.clone(),
            customer_id: customer.id.clone(),
            currency: store.currency.clone(),
            language: language.to_string(),
            lines: cart.items.clone(),
            subtotal,
            totals: totals.into_totals(),
            shipping_module: module.map(|m| m.code.clone()),
            computed_at: Utc::now(),
        });
        stage = stage.advance(Stage::Finalized)?;

        info!(
            store = %summary.store_code(),
            customer = %summary.customer_id(),
            stage = %stage,
            subtotal = %summary.subtotal(),
            totals = summary.totals().len(),
            grand_total = %summary.grand_total(),
            "Order totals computed"
        );

        Ok(summary)
    }

    /// Customer preference, then the store default, then the configured
    /// default.
    fn language_for<'a>(&'a self, customer: &'a Customer, store: &'a Store) -> &'a str {
        customer
            .language
            .as_deref()
            .filter(|l| !l.is_empty())
            .or_else(|| Some(store.default_language.as_str()).filter(|l| !l.is_empty()))
            .unwrap_or_else(|| self.config.default_language())
    }

    async fn quote_shipping(
        &self,
        module: &ShippingModule,
        cart: &Cart,
        delivery: &Delivery,
    ) -> EngineResult<checkout_core::OrderTotal> {
        let stage = format!("shipping_quote {}", module.code);
        let quoter = self.quoters.get(&module.code).ok_or_else(|| {
            EngineError::calculation_failed(stage.as_str(), "no quoter registered for module")
        })?;

        let cost = quoter
            .quote(&cart.package_details(), delivery)
            .await
            .map_err(|e| EngineError::calculation_failed(stage.as_str(), e))?;
        if cost.is_negative() {
            return Err(EngineError::calculation_failed(
                stage,
                format!("quoter returned a negative cost ({cost})"),
            ));
        }

        debug!(module = %module.code, quoter = %quoter.name(), cost = %cost, "Shipping quoted");
        Ok(apply_shipping_cost(module, cost))
    }
}

/// Plugin output must keep every later sum inside the supported amount range.
fn ensure_in_range(stage: String, subtotal: Money, totals: &TotalAccumulator) -> EngineResult<()> {
    if checked_magnitude(subtotal, totals.totals()).is_none() {
        warn!(stage = %stage, subtotal = %subtotal, "Order amounts out of range");
        return Err(EngineError::calculation_failed(
            stage,
            "order amounts exceed the supported range",
        ));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlatRateSettings, PercentageDiscountSettings, StoreOverrides};
    use crate::quote::FlatRateQuoter;
    use crate::rate_table::tests::{canadian_source, FakeSource};
    use async_trait::async_trait;
    use checkout_core::{LineItem, OrderTotal, RatePercent, ShippingRegion};
    use rust_decimal_macros::dec;

    fn store() -> Store {
        Store {
            code: "DEFAULT".to_string(),
            name: "Default".to_string(),
            currency: "CAD".to_string(),
            default_language: "en".to_string(),
            address: Delivery::new("CA").with_zone("ON"),
        }
    }

    fn cart_100() -> Cart {
        Cart::new()
            .with_item(LineItem::new("BOOK-1", "Book", Money::from_cents(10_000), 1))
            .unwrap()
    }

    fn quebec() -> Delivery {
        Delivery::new("CA").with_zone("QC")
    }

    fn pipeline(source: FakeSource, config: EngineConfig) -> OrderTotalPipeline {
        OrderTotalPipeline::new(Arc::new(RateTable::new(Arc::new(source))), config)
    }

    fn without_modules() -> FakeSource {
        FakeSource {
            modules: Vec::new(),
            ..canadian_source()
        }
    }

    struct FailingProcessor;

    #[async_trait]
    impl OrderTotalPostProcessor for FailingProcessor {
        fn name(&self) -> &str {
            "broken"
        }

        async fn process(&self, _ctx: &PostProcessContext<'_>) -> EngineResult<Vec<OrderTotal>> {
            Err(EngineError::Config("loyalty service unavailable".to_string()))
        }
    }

    #[test]
    fn test_stage_transitions() {
        let stage = Stage::Started.advance(Stage::RatesResolved).unwrap();
        assert_eq!(stage, Stage::RatesResolved);

        let err = Stage::Started.advance(Stage::Finalized).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid calculation stage transition: started -> finalized"
        );
        assert!(Stage::Finalized.advance(Stage::Started).is_err());
        assert!(Stage::RatesResolved.advance(Stage::RatesResolved).is_err());
    }

    #[tokio::test]
    async fn test_quebec_order_without_shipping() {
        let pipeline = pipeline(without_modules(), EngineConfig::default());

        let summary = pipeline
            .compute(&cart_100(), &quebec(), &Customer::new("c1"), &store())
            .await
            .unwrap();

        assert_eq!(summary.subtotal().cents(), 10_000);
        assert_eq!(summary.find("GST").unwrap().value.cents(), 500);
        assert_eq!(summary.find("QST").unwrap().value.cents(), 998);
        assert_eq!(summary.grand_total().cents(), 11_498);
        assert_eq!(summary.shipping_module(), None);
        assert_eq!(summary.language(), "en");
    }

    #[tokio::test]
    async fn test_compute_is_deterministic() {
        let pipeline = pipeline(without_modules(), EngineConfig::default());
        let customer = Customer::new("c1");

        let first = pipeline.compute(&cart_100(), &quebec(), &customer, &store()).await.unwrap();
        let second = pipeline.compute(&cart_100(), &quebec(), &customer, &store()).await.unwrap();

        assert_eq!(first.totals(), second.totals());
        assert_eq!(first.grand_total(), second.grand_total());
    }

    #[tokio::test]
    async fn test_french_customer_picks_up_language_scoped_rate() {
        let pipeline = pipeline(without_modules(), EngineConfig::default());
        let customer = Customer::new("c1").with_language("fr");

        let summary = pipeline.compute(&cart_100(), &quebec(), &customer, &store()).await.unwrap();

        assert_eq!(summary.language(), "fr");
        assert_eq!(summary.find("ECO").unwrap().value.cents(), 100);
        assert_eq!(summary.grand_total().cents(), 11_598);
    }

    #[tokio::test]
    async fn test_undeliverable_country() {
        let pipeline = pipeline(canadian_source(), EngineConfig::default());

        let err = pipeline
            .compute(&cart_100(), &Delivery::new("FR"), &Customer::new("c1"), &store())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoApplicableShippingMethod { ref country, .. } if country == "FR"));
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_zero_tax() {
        let source = FakeSource {
            fail_tax_rates: true,
            ..without_modules()
        };
        let pipeline = pipeline(source, EngineConfig::default());

        let err = pipeline
            .compute(&cart_100(), &quebec(), &Customer::new("c1"), &store())
            .await
            .unwrap_err();
        assert!(err.is_calculation_failure());
    }

    #[tokio::test]
    async fn test_unknown_store() {
        let pipeline = pipeline(canadian_source(), EngineConfig::default());
        let mut other = store();
        other.code = "OUTLET".to_string();

        let err = pipeline
            .compute(&cart_100(), &quebec(), &Customer::new("c1"), &other)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_cart_is_invalid() {
        let pipeline = pipeline(canadian_source(), EngineConfig::default());

        let err = pipeline
            .compute(&Cart::new(), &quebec(), &Customer::new("c1"), &store())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_oversized_cart_is_invalid() {
        let pipeline = pipeline(without_modules(), EngineConfig::default());
        let cart = Cart::new()
            .with_item(LineItem::new("BIG", "Big", Money::from_cents(i64::MAX / 2), 3))
            .unwrap();

        let err = pipeline
            .compute(&cart, &quebec(), &Customer::new("c1"), &store())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_out_of_range_shipping_quote_fails() {
        let pipeline = pipeline(canadian_source(), EngineConfig::default()).with_quoter(
            "CANADAPOST",
            Arc::new(FlatRateQuoter::new("CANADAPOST", Money::from_cents(i64::MAX), Money::zero())),
        );

        let err = pipeline
            .compute(&cart_100(), &quebec(), &Customer::new("c1"), &store())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CalculationFailed { ref stage, .. } if stage == "shipping_quote CANADAPOST"));
    }

    #[tokio::test]
    async fn test_shipping_discount_and_tax_on_shipping() {
        let mut config = EngineConfig::default();
        config.shipping.flat_rates.insert(
            "CANADAPOST".to_string(),
            FlatRateSettings {
                base_cents: 1_000,
                per_item_cents: 0,
                free_over_cents: None,
            },
        );
        config.discounts.insert(
            "spring".to_string(),
            PercentageDiscountSettings {
                code: "SPRING10".to_string(),
                label: None,
                rate: RatePercent::new(dec!(10)).unwrap(),
                min_subtotal_cents: 0,
            },
        );
        config.stores.insert(
            "DEFAULT".to_string(),
            StoreOverrides {
                tax_basis: None,
                tax_on_shipping: Some(true),
                post_processors: Some(vec!["spring".to_string()]),
            },
        );
        let pipeline = pipeline(canadian_source(), config);

        let summary = pipeline
            .compute(&cart_100(), &quebec(), &Customer::new("c1"), &store())
            .await
            .unwrap();

        let kinds: Vec<_> = summary.totals().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OrderTotalKind::Discount,
                OrderTotalKind::Shipping,
                OrderTotalKind::Tax,
                OrderTotalKind::Tax,
            ]
        );
        // base 100.00 - 10.00 + 10.00 shipping = 100.00
        assert_eq!(summary.find("SPRING10").unwrap().value.cents(), -1_000);
        assert_eq!(summary.find("GST").unwrap().value.cents(), 500);
        assert_eq!(summary.find("QST").unwrap().value.cents(), 998);
        assert_eq!(summary.shipping_module(), Some("CANADAPOST"));
        assert_eq!(summary.grand_total().cents(), 10_000 - 1_000 + 1_000 + 500 + 998);
    }

    #[tokio::test]
    async fn test_tax_basis_store_uses_store_address() {
        let mut config = EngineConfig::default();
        config.stores.insert(
            "DEFAULT".to_string(),
            StoreOverrides {
                tax_basis: Some(checkout_core::TaxBasis::Store),
                ..Default::default()
            },
        );
        let pipeline = pipeline(without_modules(), config);

        // Store sits in ON; the QC-only QST must not apply.
        let summary = pipeline
            .compute(&cart_100(), &quebec(), &Customer::new("c1"), &store())
            .await
            .unwrap();
        assert!(summary.find("QST").is_none());
        assert_eq!(summary.grand_total().cents(), 10_500);
    }

    #[tokio::test]
    async fn test_failing_post_processor_aborts() {
        let mut config = EngineConfig::default();
        config.pricing.post_processors = vec!["broken".to_string()];
        let pipeline = pipeline(without_modules(), config).with_post_processor(Arc::new(FailingProcessor));

        let err = pipeline
            .compute(&cart_100(), &quebec(), &Customer::new("c1"), &store())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CalculationFailed { ref stage, .. } if stage == "post_processor broken"));
    }

    #[tokio::test]
    async fn test_missing_quoter_fails() {
        let pipeline = pipeline(canadian_source(), EngineConfig::default());

        let err = pipeline
            .compute(&cart_100(), &quebec(), &Customer::new("c1"), &store())
            .await
            .unwrap_err();
        assert!(err.is_calculation_failure());
    }

    #[tokio::test]
    async fn test_from_source_applies_rate_table_settings() {
        let mut config = EngineConfig::default();
        config.rate_table.cache_enabled = false;
        let pipeline = OrderTotalPipeline::from_source(Arc::new(without_modules()), config);

        pipeline
            .compute(&cart_100(), &quebec(), &Customer::new("c1"), &store())
            .await
            .unwrap();
        assert!(pipeline.rate_table().cached_stores().await.is_empty());
    }

    #[tokio::test]
    async fn test_current_module_is_sticky() {
        let source = FakeSource {
            modules: vec![
                ShippingModule::new("CANADAPOST", 1, vec![ShippingRegion::country("CA")]),
                ShippingModule::new("PUROLATOR", 5, vec![ShippingRegion::country("CA")]),
            ],
            ..canadian_source()
        };
        let pipeline = pipeline(source, EngineConfig::default())
            .with_quoter("CANADAPOST", Arc::new(FlatRateQuoter::new("CANADAPOST", Money::from_cents(995), Money::zero())))
            .with_quoter("PUROLATOR", Arc::new(FlatRateQuoter::new("PUROLATOR", Money::from_cents(1_495), Money::zero())));
        let customer = Customer::new("c1");

        let fresh = pipeline.compute(&cart_100(), &quebec(), &customer, &store()).await.unwrap();
        assert_eq!(fresh.shipping_module(), Some("CANADAPOST"));

        let sticky = pipeline
            .compute_with_module(&cart_100(), &quebec(), &customer, &store(), Some("PUROLATOR"))
            .await
            .unwrap();
        assert_eq!(sticky.shipping_module(), Some("PUROLATOR"));
        assert_eq!(sticky.total_of(OrderTotalKind::Shipping).cents(), 1_495);
    }
}
