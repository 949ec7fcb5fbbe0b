//! # checkout-core: Pure Pricing Logic for the Checkout Engine
//!
//! This crate is the **heart** of the checkout engine. It holds the rate
//! matching rules and the order total arithmetic as pure functions with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Checkout Engine Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                checkout-engine (OrderTotalPipeline)             │   │
//! │  │    RateTable ──► RuleMatcher ──► TotalAccumulator ──► Summary   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ checkout-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌─────────────┐  ┌──────────┐  │   │
//! │  │   │   types   │  │   money   │  │   matcher   │  │accumula- │  │   │
//! │  │   │  TaxRate  │  │   Money   │  │ select_tax  │  │   tor    │  │   │
//! │  │   │ Delivery  │  │  percent  │  │ select_ship │  │ apply_*  │  │   │
//! │  │   └───────────┘  └───────────┘  └─────────────┘  └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 checkout-db (Database Layer)                    │   │
//! │  │          SQLite rate tables, order snapshots, migrations        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (TaxRate, ShippingModule, Delivery, OrderTotal, ...)
//! - [`money`] - Money type with integer cents and half-up percentage math
//! - [`matcher`] - Rate and shipping module selection (tie-break policy)
//! - [`accumulator`] - Folding adjustments into a running list of totals
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Example Usage
//!
//! ```rust
//! use checkout_core::money::Money;
//! use checkout_core::types::RatePercent;
//! use rust_decimal::Decimal;
//! use std::str::FromStr;
//!
//! let base = Money::from_cents(10_000); // $100.00
//! let qst = RatePercent::new(Decimal::from_str("9.975").unwrap()).unwrap();
//!
//! // $100.00 × 9.975% = $9.975 → $9.98 (half-up)
//! assert_eq!(base.percentage(qst).cents(), 998);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod accumulator;
pub mod error;
pub mod matcher;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Store code used when a caller does not name a store.
pub const DEFAULT_STORE_CODE: &str = "DEFAULT";

/// Maximum distinct line items in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum unit price in cents (100,000,000.00).
pub const MAX_UNIT_PRICE_CENTS: i64 = 10_000_000_000;

/// Largest amount a single order line or adjustment may carry.
///
/// A full cart at the item, quantity and price limits stays below this, and
/// so does any sum of a few thousand such amounts, far from `i64::MAX`.
pub const MAX_ORDER_AMOUNT_CENTS: i64 = MAX_CART_ITEMS as i64 * MAX_ITEM_QUANTITY * MAX_UNIT_PRICE_CENTS;
