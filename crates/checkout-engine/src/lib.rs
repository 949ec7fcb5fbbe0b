//! # checkout-engine: Order Total Calculation
//!
//! Resolves a store's tax rates and shipping module for a delivery, runs the
//! configured adjustments and produces an immutable
//! [`OrderSummary`](checkout_core::OrderSummary).
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Order Total Calculation                         │
//! │                                                                         │
//! │  caller: cart, delivery, customer, store                               │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      OrderTotalPipeline                          │  │
//! │  │  Started → RatesResolved → AdjustmentsApplied → Finalized        │  │
//! │  └───────┬──────────────────────┬─────────────────────┬─────────────┘  │
//! │          │                      │                     │                │
//! │          ▼                      ▼                     ▼                │
//! │  ┌────────────────┐  ┌────────────────────┐  ┌──────────────────────┐  │
//! │  │   RateTable    │  │  Post-processors   │  │  Shipping quoters    │  │
//! │  │                │  │                    │  │                      │  │
//! │  │ Arc snapshots  │  │ discounts, fees    │  │ per module code      │  │
//! │  │ per store      │  │ (store-ordered)    │  │ (flat rate built in) │  │
//! │  └───────┬────────┘  └────────────────────┘  └──────────────────────┘  │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  ┌────────────────┐                                                     │
//! │  │  RateSource    │  checkout-db::Database (SQLite)                    │
//! │  └────────────────┘                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Engine configuration (TOML + `CHECKOUT_*` env)
//! - [`error`] - Engine error types
//! - [`pipeline`] - The `OrderTotalPipeline` state machine
//! - [`post_processor`] - Adjustment plugins and their registry
//! - [`quote`] - Shipping quoter plugins and their registry
//! - [`rate_table`] - Per-store rate cache
//! - [`source`] - Where rates are loaded from

pub mod config;
pub mod error;
pub mod pipeline;
pub mod post_processor;
pub mod quote;
pub mod rate_table;
pub mod source;

pub use config::{EngineConfig, PricingPolicy};
pub use error::{EngineError, EngineResult};
pub use pipeline::{OrderTotalPipeline, Stage};
pub use post_processor::{
    OrderTotalPostProcessor, PercentageDiscountProcessor, PostProcessContext,
    PostProcessorRegistry,
};
pub use quote::{FlatRateQuoter, QuoterRegistry, ShippingQuoter};
pub use rate_table::{RateTable, StoreRates};
pub use source::RateSource;
