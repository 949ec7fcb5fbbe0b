//! # Total Accumulator
//!
//! Turns selected rates and quoted costs into [`OrderTotal`] adjustments and
//! folds them into a running list.
//!
//! ## Rules
//! - Every adjustment is rounded exactly once, when it is created
//! - Totals are appended, never merged: GST and QST stay two lines even
//!   though both are `Tax`
//! - The grand total is only summed at the very end
//!
//! ```text
//! subtotal 100.00
//!    │
//!    ├── apply_tax(GST 5%)      → [GST 5.00]
//!    ├── apply_tax(QST 9.975%)  → [GST 5.00, QST 9.98]
//!    │
//!    ▼
//! grand_total = 100.00 + 5.00 + 9.98 = 114.98
//! ```

use crate::money::Money;
use crate::types::{OrderTotal, OrderTotalKind, RatePercent, ShippingModule, TaxRate};
use crate::MAX_ORDER_AMOUNT_CENTS;

/// Computes one tax line: `round(base × rate / 100)` half-up, labelled with
/// the rate code. The rate value is snapshotted onto the total.
///
/// ```rust
/// use checkout_core::accumulator::apply_tax;
/// use checkout_core::{Money, RatePercent, TaxRate};
///
/// let gst = TaxRate::new("DEFAULT", "GST", "CA", RatePercent::from_bps(500), 1);
/// let total = apply_tax(&gst, Money::from_cents(10_000));
/// assert_eq!(total.label, "GST");
/// assert_eq!(total.value.cents(), 500);
/// ```
pub fn apply_tax(rate: &TaxRate, base: Money) -> OrderTotal {
    OrderTotal::tax(rate.code.clone(), rate.rate, base.percentage(rate.rate))
}

/// Applies a sequence of selected rates to one base.
///
/// Non-compound rates use `base`. A compound rate uses `base` plus every
/// tax line produced before it in this call.
pub fn apply_taxes(rates: &[&TaxRate], base: Money) -> Vec<OrderTotal> {
    let mut lines: Vec<OrderTotal> = Vec::with_capacity(rates.len());
    for rate in rates {
        let rate_base = if rate.compound {
            base + lines.iter().map(|t| t.value).sum::<Money>()
        } else {
            base
        };
        lines.push(apply_tax(rate, rate_base));
    }
    lines
}

/// Folds an externally quoted shipping cost into a shipping line.
pub fn apply_shipping_cost(module: &ShippingModule, quoted: Money) -> OrderTotal {
    OrderTotal::shipping(module.code.clone(), quoted)
}

/// A fixed discount line. `amount` is the reduction; the stored value is
/// negative.
pub fn apply_discount(
    code: impl Into<String>,
    label: impl Into<String>,
    amount: Money,
) -> OrderTotal {
    OrderTotal::discount(code, label, amount)
}

/// A percentage-off discount line (negative value, rate snapshotted).
pub fn apply_percentage_discount(
    code: impl Into<String>,
    label: impl Into<String>,
    rate: RatePercent,
    base: Money,
) -> OrderTotal {
    OrderTotal::discount(code, label, base.non_negative().percentage(rate)).with_rate(rate)
}

/// Appends `new` to `existing`, preserving insertion order.
pub fn accumulate(mut existing: Vec<OrderTotal>, new: OrderTotal) -> Vec<OrderTotal> {
    existing.push(new);
    existing
}

/// Sum of the values of one kind of adjustment.
pub fn sum_of(totals: &[OrderTotal], kind: OrderTotalKind) -> Money {
    totals
        .iter()
        .filter(|t| t.kind == kind)
        .map(|t| t.value)
        .sum()
}

/// Base amount plus every adjustment (discounts are already negative).
pub fn grand_total(base: Money, totals: &[OrderTotal]) -> Money {
    base + totals.iter().map(|t| t.value).sum::<Money>()
}

/// `|base| + Σ |value|`, or `None` when it overflows or exceeds
/// [`MAX_ORDER_AMOUNT_CENTS`].
///
/// Any partial sum of these amounts (tax base, grand total) is bounded by the
/// magnitude, so a `Some` here means later folds cannot overflow.
pub fn checked_magnitude(base: Money, totals: &[OrderTotal]) -> Option<Money> {
    let magnitude = totals
        .iter()
        .map(|t| t.value)
        .try_fold(base.cents().checked_abs()?, |acc, value| {
            acc.checked_add(value.cents().checked_abs()?)
        })?;
    (magnitude <= MAX_ORDER_AMOUNT_CENTS).then(|| Money::from_cents(magnitude))
}

// =============================================================================
// Running Accumulator
// =============================================================================

/// A running list of adjustments for one calculation.
#[derive(Debug, Clone, Default)]
pub struct TotalAccumulator {
    totals: Vec<OrderTotal>,
}

impl TotalAccumulator {
    pub fn new() -> Self {
        TotalAccumulator { totals: Vec::new() }
    }

    pub fn push(&mut self, total: OrderTotal) {
        self.totals = accumulate(std::mem::take(&mut self.totals), total);
    }

    pub fn extend(&mut self, totals: impl IntoIterator<Item = OrderTotal>) {
        for total in totals {
            self.push(total);
        }
    }

    pub fn totals(&self) -> &[OrderTotal] {
        &self.totals
    }

    /// Sum of every adjustment so far.
    pub fn adjustments(&self) -> Money {
        self.totals.iter().map(|t| t.value).sum()
    }

    pub fn sum_of(&self, kind: OrderTotalKind) -> Money {
        sum_of(&self.totals, kind)
    }

    pub fn into_totals(self) -> Vec<OrderTotal> {
        self.totals
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
