//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Fixed-Point, Never Floating Point
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ rounding drift                   │
//! │                                                                         │
//! │  OUR SOLUTION: integer cents + decimal percentages                      │
//! │    amounts:  i64 cents (exactly 2 decimal places)                       │
//! │    rates:    rust_decimal::Decimal (9.975% is exact)                    │
//! │    product:  computed in Decimal, rounded ONCE, half-up, back to cents  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use checkout_core::money::Money;
//!
//! let price = Money::from_cents(1099); // 10.99
//! let line = price * 2;                // 21.98
//! let total = line + Money::from_cents(500);
//! assert_eq!(total.cents(), 2698);
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use crate::types::RatePercent;

/// Number of decimal places carried by every amount.
pub const MONEY_SCALE: u32 = 2;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: discounts are carried as negative adjustments
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Serialized as plain cents**: `{"value": 998}` not `{"value": {"0": 998}}`
///
/// ## Where Money Flows
/// ```text
/// LineItem.unit_price ──► line_total ──► subtotal ──┬──► tax base
///                                                   │
///          shipping quote ──► OrderTotal(Shipping) ─┤
///          discount ────────► OrderTotal(Discount) ─┤
///          rate × base ─────► OrderTotal(Tax) ──────┴──► grand total
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use checkout_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Converts a decimal amount (e.g. `"19.99"`) into Money.
    ///
    /// Extra precision is rounded half-up to cents. Returns `None` when the
    /// value does not fit in an i64 of cents.
    ///
    /// ```rust
    /// use checkout_core::money::Money;
    /// use rust_decimal::Decimal;
    /// use std::str::FromStr;
    ///
    /// let amount = Money::from_decimal(Decimal::from_str("19.995").unwrap()).unwrap();
    /// assert_eq!(amount.cents(), 2000);
    /// ```
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        let cents = (amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        cents.to_i64().map(Money)
    }

    /// Returns the value as a Decimal with two decimal places.
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, MONEY_SCALE)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Clamps negative amounts to zero (a discount larger than the subtotal
    /// must not produce a negative tax base).
    #[inline]
    pub const fn non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Computes `self × rate / 100`, rounded once to cents, half-up.
    ///
    /// ## Half-Up Rounding
    /// ```text
    /// 100.00 × 5%     = 5.000   → 5.00
    /// 100.00 × 9.975% = 9.975   → 9.98   (midpoint goes away from zero)
    /// -10.01 × 50%    = -5.005  → -5.01  (symmetric for negatives)
    /// ```
    ///
    /// The product is computed exactly in Decimal and rounded a single time,
    /// so repeated calls with the same inputs always agree.
    ///
    /// ```rust
    /// use checkout_core::money::Money;
    /// use checkout_core::types::RatePercent;
    ///
    /// let tax = Money::from_cents(1000).percentage(RatePercent::from_bps(825));
    /// // 10.00 × 8.25% = 0.825 → 0.83
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn percentage(&self, rate: RatePercent) -> Money {
        let exact = Decimal::from(self.0) * rate.value() / Decimal::ONE_HUNDRED;
        let rounded = exact.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        // |rate| <= 100 so the result never exceeds |self| and always fits.
        Money(rounded.to_i64().unwrap_or_default())
    }

    /// Multiplies a unit price by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// `self + other`, or `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// `self × qty`, or `None` on overflow.
    #[inline]
    pub const fn checked_mul(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering (`-5.50`). Currency symbols are a UI concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by quantity.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
