//! # Repository Module
//!
//! Database repository implementations for the checkout engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories                                         │
//! │                                                                         │
//! │  RateTable::reload("DEFAULT")                                          │
//! │       │                                                                 │
//! │       │  db.tax_rates().list_active("DEFAULT")                         │
//! │       ▼                                                                 │
//! │  TaxRateRepository                                                     │
//! │  ├── insert / update_rate / set_active / delete                        │
//! │  └── list_active / list_for_country                                    │
//! │       │                                                                 │
//! │       │  SQL → TaxRateRow (FromRow) → TaxRate (TryFrom)                │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are decoded into private `*Row` structs and converted into
//! checkout-core types with `TryFrom`, so a malformed row surfaces as
//! [`DbError::CorruptRecord`](crate::DbError::CorruptRecord) rather than a
//! panic.
//!
//! ## Available Repositories
//!
//! - [`StoreRepository`](store::StoreRepository) - Stores and their addresses
//! - [`TaxRateRepository`](tax_rate::TaxRateRepository) - Tax rate configuration
//! - [`ShippingModuleRepository`](shipping::ShippingModuleRepository) - Modules and regions
//! - [`OrderRepository`](order::OrderRepository) - Finalized order snapshots

pub mod order;
pub mod shipping;
pub mod store;
pub mod tax_rate;

use std::str::FromStr;

use checkout_core::RatePercent;
use rust_decimal::Decimal;

use crate::error::{DbError, DbResult};

/// Parses a TEXT percentage column back into a [`RatePercent`].
pub(crate) fn parse_rate(entity: &str, id: &str, raw: &str) -> DbResult<RatePercent> {
    let value = Decimal::from_str(raw).map_err(|e| DbError::corrupt(entity, id, e))?;
    RatePercent::new(value).map_err(|e| DbError::corrupt(entity, id, e))
}

/// Renders a percentage for a TEXT column (`9.975`, never `9.9750`).
pub(crate) fn format_rate(rate: RatePercent) -> String {
    rate.value().normalize().to_string()
}
