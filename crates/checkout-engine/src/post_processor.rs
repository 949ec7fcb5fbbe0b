//! # Order Total Post-Processors
//!
//! Named plugins that add adjustments (discounts, fees) after the subtotal is
//! known and before shipping and tax are applied. Each store lists the
//! processors it runs, in order, under `post_processors` in its config.
//!
//! ## Failure Semantics
//! ```text
//! processors: [loyalty, spring_sale, handling_fee]
//!                  │          │
//!                  ok         ✗ error
//!                             │
//!                             ▼
//!               CalculationFailed { stage: "post_processor spring_sale" }
//!               (loyalty's totals are discarded with the calculation)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use checkout_core::accumulator::apply_percentage_discount;
use checkout_core::{Cart, Customer, Delivery, Money, OrderTotal, OrderTotalKind, RatePercent, Store};
use tracing::debug;

use crate::config::PercentageDiscountSettings;
use crate::error::{EngineError, EngineResult};

/// What a post-processor can see of the calculation in progress.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessContext<'a> {
    pub store: &'a Store,
    pub customer: &'a Customer,
    pub delivery: &'a Delivery,
    pub cart: &'a Cart,
    pub subtotal: Money,
    /// Adjustments produced by processors that ran earlier.
    pub totals: &'a [OrderTotal],
}

impl PostProcessContext<'_> {
    /// Subtotal after every discount applied so far.
    pub fn discounted_subtotal(&self) -> Money {
        self.subtotal
            + self
                .totals
                .iter()
                .filter(|t| t.kind == OrderTotalKind::Discount)
                .map(|t| t.value)
                .sum::<Money>()
    }
}

/// Produces zero or more adjustments for an order.
#[async_trait]
pub trait OrderTotalPostProcessor: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, ctx: &PostProcessContext<'_>) -> EngineResult<Vec<OrderTotal>>;
}

// =============================================================================
// Percentage Discount
// =============================================================================

/// Takes a percentage off the (already discounted) subtotal once it reaches
/// a minimum.
#[derive(Debug, Clone)]
pub struct PercentageDiscountProcessor {
    name: String,
    code: String,
    label: String,
    rate: RatePercent,
    min_subtotal: Money,
}

impl PercentageDiscountProcessor {
    pub fn new(name: impl Into<String>, code: impl Into<String>, rate: RatePercent) -> Self {
        let code = code.into();
        PercentageDiscountProcessor {
            name: name.into(),
            label: code.clone(),
            code,
            rate,
            min_subtotal: Money::zero(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_min_subtotal(mut self, min: Money) -> Self {
        self.min_subtotal = min;
        self
    }

    pub fn from_settings(name: impl Into<String>, settings: &PercentageDiscountSettings) -> Self {
        let processor = Self::new(name, settings.code.clone(), settings.rate)
            .with_min_subtotal(Money::from_cents(settings.min_subtotal_cents));
        match &settings.label {
            Some(label) => processor.with_label(label.clone()),
            None => processor,
        }
    }
}

#[async_trait]
impl OrderTotalPostProcessor for PercentageDiscountProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, ctx: &PostProcessContext<'_>) -> EngineResult<Vec<OrderTotal>> {
        let base = ctx.discounted_subtotal();
        if base < self.min_subtotal || self.rate.is_zero() {
            debug!(processor = %self.name, base = %base, "Discount not applicable");
            return Ok(Vec::new());
        }

        Ok(vec![apply_percentage_discount(
            self.code.clone(),
            self.label.clone(),
            self.rate,
            base,
        )])
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Post-processors keyed by name.
#[derive(Clone, Default)]
pub struct PostProcessorRegistry {
    processors: HashMap<String, Arc<dyn OrderTotalPostProcessor>>,
}

impl std::fmt::Debug for PostProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.processors.keys().collect();
        names.sort();
        f.debug_struct("PostProcessorRegistry").field("names", &names).finish()
    }
}

impl PostProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one [`PercentageDiscountProcessor`] per `[discounts.<name>]`.
    pub fn from_settings<'a>(
        discounts: impl IntoIterator<Item = (&'a String, &'a PercentageDiscountSettings)>,
    ) -> Self {
        let mut registry = Self::new();
        for (name, settings) in discounts {
            registry.register(Arc::new(PercentageDiscountProcessor::from_settings(
                name.clone(),
                settings,
            )));
        }
        registry
    }

    /// Registers (or replaces) a processor under its own name.
    pub fn register(&mut self, processor: Arc<dyn OrderTotalPostProcessor>) {
        self.processors.insert(processor.name().to_string(), processor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OrderTotalPostProcessor>> {
        self.processors.get(name).cloned()
    }

    /// Looks up `names` in order. An unknown name is a configuration error.
    pub fn resolve(&self, names: &[String]) -> EngineResult<Vec<Arc<dyn OrderTotalPostProcessor>>> {
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| {
                    EngineError::Config(format!("unknown post-processor '{name}'"))
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
