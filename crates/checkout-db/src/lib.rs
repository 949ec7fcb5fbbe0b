//! # checkout-db: Database Layer for the Checkout Engine
//!
//! Persistent rate configuration and finalized order snapshots, stored in
//! SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Checkout Data Flow                               │
//! │                                                                         │
//! │  RateTable::reload / OrderTotalPipeline::compute_and_store             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   checkout-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────┐   ┌──────────────┐ │   │
//! │  │   │   Database    │    │  Repositories    │   │  Migrations  │ │   │
//! │  │   │   (pool.rs)   │◄───│ StoreRepository  │   │  (embedded)  │ │   │
//! │  │   │  SqlitePool   │    │ TaxRateRepository│   │ 001_init.sql │ │   │
//! │  │   │               │    │ ShippingModule.. │   │              │ │   │
//! │  │   │               │    │ OrderRepository  │   │              │ │   │
//! │  │   └───────────────┘    └──────────────────┘   └──────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL)                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`pool`] - Connection pool management
//! - [`migrations`] - Embedded SQL migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("checkout.db")).await?;
//! let rates = db.tax_rates().list_active("DEFAULT").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::order::{OrderRepository, StoredOrder};
pub use repository::shipping::ShippingModuleRepository;
pub use repository::store::StoreRepository;
pub use repository::tax_rate::TaxRateRepository;
