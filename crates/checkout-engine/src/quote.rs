//! # Shipping Quotes
//!
//! A [`ShippingQuoter`] prices a parcel for one shipping module. The pipeline
//! picks the module with the rule matcher, then asks the quoter registered
//! under that module's code.
//!
//! ```text
//! select_shipping_module ──► "CANADAPOST"
//!                                 │
//!                      QuoterRegistry.get("CANADAPOST")
//!                                 │
//!                                 ▼
//!           FlatRateQuoter.quote(package, delivery) ──► 9.95 + 1.50 × qty
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use checkout_core::{Delivery, Money, PackageDetails};
use tracing::debug;

use crate::config::{FlatRateSettings, ShippingSettings};
use crate::error::{EngineError, EngineResult};

/// Prices shipping for a package going to a delivery address.
#[async_trait]
pub trait ShippingQuoter: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    async fn quote(&self, package: &PackageDetails, delivery: &Delivery) -> EngineResult<Money>;
}

// =============================================================================
// Flat Rate Quoter
// =============================================================================

/// `base + per_item × total quantity`, free above a declared value.
#[derive(Debug, Clone)]
pub struct FlatRateQuoter {
    name: String,
    base: Money,
    per_item: Money,
    free_over: Option<Money>,
}

impl FlatRateQuoter {
    pub fn new(name: impl Into<String>, base: Money, per_item: Money) -> Self {
        FlatRateQuoter {
            name: name.into(),
            base,
            per_item,
            free_over: None,
        }
    }

    pub fn free_over(mut self, threshold: Money) -> Self {
        self.free_over = Some(threshold);
        self
    }

    pub fn from_settings(name: impl Into<String>, settings: &FlatRateSettings) -> Self {
        FlatRateQuoter {
            name: name.into(),
            base: settings.base(),
            per_item: settings.per_item(),
            free_over: settings.free_over(),
        }
    }
}

#[async_trait]
impl ShippingQuoter for FlatRateQuoter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote(&self, package: &PackageDetails, _delivery: &Delivery) -> EngineResult<Money> {
        if let Some(threshold) = self.free_over {
            if package.declared_value >= threshold {
                return Ok(Money::zero());
            }
        }

        self.per_item
            .checked_mul(package.total_quantity)
            .and_then(|items| self.base.checked_add(items))
            .ok_or_else(|| {
                EngineError::calculation_failed(
                    format!("shipping_quote {}", self.name),
                    "flat rate overflows",
                )
            })
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Quoters keyed by shipping module code.
#[derive(Clone, Default)]
pub struct QuoterRegistry {
    quoters: HashMap<String, Arc<dyn ShippingQuoter>>,
}

impl std::fmt::Debug for QuoterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut codes: Vec<_> = self.quoters.keys().collect();
        codes.sort();
        f.debug_struct("QuoterRegistry").field("modules", &codes).finish()
    }
}

impl QuoterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one [`FlatRateQuoter`] per `[shipping.flat_rates.<module>]`.
    pub fn from_settings(settings: &ShippingSettings) -> Self {
        let mut registry = Self::new();
        for (module, flat) in &settings.flat_rates {
            debug!(module = %module, base = %flat.base(), "Registering flat-rate quoter");
            registry.register(module.clone(), Arc::new(FlatRateQuoter::from_settings(module, flat)));
        }
        registry
    }

    /// Registers (or replaces) the quoter for a module code.
    pub fn register(&mut self, module_code: impl Into<String>, quoter: Arc<dyn ShippingQuoter>) {
        self.quoters.insert(module_code.into(), quoter);
    }

    pub fn get(&self, module_code: &str) -> Option<Arc<dyn ShippingQuoter>> {
        self.quoters.get(module_code).cloned()
    }

    pub fn len(&self) -> usize {
        self.quoters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quoters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(total_quantity: i64, declared_cents: i64) -> PackageDetails {
        PackageDetails {
            item_count: 1,
            total_quantity,
            weight_grams: 0,
            declared_value: Money::from_cents(declared_cents),
        }
    }

    #[tokio::test]
    async fn test_flat_rate_quote() {
        let quoter = FlatRateQuoter::new("CANADAPOST", Money::from_cents(995), Money::from_cents(150));
        let cost = quoter.quote(&package(3, 4000), &Delivery::new("CA")).await.unwrap();
        assert_eq!(cost.cents(), 995 + 450);
    }

    #[tokio::test]
    async fn test_free_over_threshold() {
        let quoter = FlatRateQuoter::new("CANADAPOST", Money::from_cents(995), Money::zero())
            .free_over(Money::from_cents(15_000));

        let delivery = Delivery::new("CA");
        assert_eq!(quoter.quote(&package(1, 14_999), &delivery).await.unwrap().cents(), 995);
        assert!(quoter.quote(&package(1, 15_000), &delivery).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_flat_rate_overflow_is_an_error() {
        let quoter = FlatRateQuoter::new("CANADAPOST", Money::zero(), Money::from_cents(i64::MAX / 2));
        let err = quoter.quote(&package(3, 0), &Delivery::new("CA")).await.unwrap_err();
        assert!(err.is_calculation_failure());
    }

    #[test]
    fn test_registry_from_settings() {
        let mut settings = ShippingSettings::default();
        settings.flat_rates.insert(
            "USPS".to_string(),
            FlatRateSettings {
                base_cents: 700,
                per_item_cents: 0,
                free_over_cents: None,
            },
        );

        let registry = QuoterRegistry::from_settings(&settings);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("USPS").unwrap().name(), "USPS");
        assert!(registry.get("CANADAPOST").is_none());
    }
}
