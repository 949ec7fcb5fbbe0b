//! # Engine Configuration
//!
//! Configuration management for the checkout engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CHECKOUT_DATABASE_PATH=/var/lib/checkout/checkout.db               │
//! │     CHECKOUT_TAX_BASIS=billing                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/checkout-engine/checkout.toml (Linux)                    │
//! │     ~/Library/Application Support/com.checkout.engine/... (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     ./checkout.db, tax on the shipping address, no post-processors     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/checkout/checkout.db"
//! max_connections = 5
//!
//! [pricing]
//! default_store = "DEFAULT"
//! default_language = "en"
//! tax_basis = "shipping"      # shipping | billing | store
//! tax_on_shipping = false
//! post_processors = []
//!
//! [rate_table]
//! cache_enabled = true
//!
//! [stores.DEFAULT]
//! tax_on_shipping = true
//! post_processors = ["spring_sale"]
//!
//! [discounts.spring_sale]
//! code = "SPRING10"
//! label = "Spring sale 10%"
//! rate = "10"
//! min_subtotal_cents = 5000
//!
//! [shipping.flat_rates.CANADAPOST]
//! base_cents = 995
//! per_item_cents = 150
//! free_over_cents = 15000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use checkout_core::{Money, RatePercent, TaxBasis, DEFAULT_STORE_CODE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("checkout.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Pricing Settings
// =============================================================================

/// Engine-wide pricing defaults. Any store can override them under
/// `[stores.<code>]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Store used when a caller does not name one.
    #[serde(default = "default_store")]
    pub default_store: String,

    /// Language used when neither customer nor store sets one.
    #[serde(default = "default_language")]
    pub default_language: String,

    #[serde(default)]
    pub tax_basis: TaxBasis,

    /// Add the shipping total to the tax base.
    #[serde(default)]
    pub tax_on_shipping: bool,

    /// Post-processor names, run in this order.
    #[serde(default)]
    pub post_processors: Vec<String>,
}

fn default_store() -> String {
    DEFAULT_STORE_CODE.to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            default_store: default_store(),
            default_language: default_language(),
            tax_basis: TaxBasis::default(),
            tax_on_shipping: false,
            post_processors: Vec::new(),
        }
    }
}

/// Per-store overrides of [`PricingSettings`]. Unset fields inherit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreOverrides {
    #[serde(default)]
    pub tax_basis: Option<TaxBasis>,

    #[serde(default)]
    pub tax_on_shipping: Option<bool>,

    #[serde(default)]
    pub post_processors: Option<Vec<String>>,
}

/// The effective pricing rules for one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tax_basis: TaxBasis,
    pub tax_on_shipping: bool,
    pub post_processors: Vec<String>,
}

// =============================================================================
// Rate Table Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTableSettings {
    /// Keep per-store snapshots in memory. When off, every lookup reads the
    /// database.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RateTableSettings {
    fn default() -> Self {
        RateTableSettings {
            cache_enabled: true,
        }
    }
}

// =============================================================================
// Plugin Settings
// =============================================================================

/// A percentage discount post-processor, registered under its table name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentageDiscountSettings {
    /// Code written on the discount total.
    pub code: String,

    #[serde(default)]
    pub label: Option<String>,

    pub rate: RatePercent,

    /// Only applies when the subtotal reaches this amount.
    #[serde(default)]
    pub min_subtotal_cents: i64,
}

/// A flat-rate quoter for one shipping module: `base + per_item × quantity`,
/// free when the declared value reaches `free_over_cents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatRateSettings {
    pub base_cents: i64,

    #[serde(default)]
    pub per_item_cents: i64,

    #[serde(default)]
    pub free_over_cents: Option<i64>,
}

impl FlatRateSettings {
    pub fn base(&self) -> Money {
        Money::from_cents(self.base_cents)
    }

    pub fn per_item(&self) -> Money {
        Money::from_cents(self.per_item_cents)
    }

    pub fn free_over(&self) -> Option<Money> {
        self.free_over_cents.map(Money::from_cents)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingSettings {
    /// Flat-rate quoters keyed by shipping module code.
    #[serde(default)]
    pub flat_rates: BTreeMap<String, FlatRateSettings>,
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub pricing: PricingSettings,

    #[serde(default)]
    pub rate_table: RateTableSettings,

    #[serde(default)]
    pub stores: BTreeMap<String, StoreOverrides>,

    #[serde(default)]
    pub discounts: BTreeMap<String, PercentageDiscountSettings>,

    #[serde(default)]
    pub shipping: ShippingSettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`checkout.toml`), when it exists
    /// 3. `CHECKOUT_*` environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML file without applying overrides.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, toml::to_string_pretty(self)?)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.pricing.default_language.trim().is_empty() {
            return Err(EngineError::Config(
                "pricing.default_language must not be empty".into(),
            ));
        }

        if self.pricing.default_store.trim().is_empty() {
            return Err(EngineError::Config(
                "pricing.default_store must not be empty".into(),
            ));
        }

        for (module, flat) in &self.shipping.flat_rates {
            if flat.base_cents < 0 || flat.per_item_cents < 0 {
                return Err(EngineError::Config(format!(
                    "shipping.flat_rates.{module}: amounts must not be negative"
                )));
            }
        }

        for (name, discount) in &self.discounts {
            if discount.code.trim().is_empty() {
                return Err(EngineError::Config(format!(
                    "discounts.{name}.code must not be empty"
                )));
            }
        }

        Ok(())
    }

    /// Applies `CHECKOUT_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("CHECKOUT_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("CHECKOUT_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(m) => self.database.max_connections = m,
                Err(_) => warn!(value = %max, "Ignoring invalid CHECKOUT_MAX_CONNECTIONS"),
            }
        }

        if let Some(store) = lookup("CHECKOUT_DEFAULT_STORE") {
            self.pricing.default_store = store;
        }

        if let Some(language) = lookup("CHECKOUT_DEFAULT_LANGUAGE") {
            self.pricing.default_language = language;
        }

        if let Some(basis) = lookup("CHECKOUT_TAX_BASIS") {
            match basis.parse::<TaxBasis>() {
                Ok(b) => {
                    debug!(tax_basis = ?b, "Overriding tax basis from environment");
                    self.pricing.tax_basis = b;
                }
                Err(_) => warn!(value = %basis, "Ignoring invalid CHECKOUT_TAX_BASIS"),
            }
        }

        if let Some(flag) = lookup("CHECKOUT_TAX_ON_SHIPPING") {
            match flag.parse::<bool>() {
                Ok(f) => self.pricing.tax_on_shipping = f,
                Err(_) => warn!(value = %flag, "Ignoring invalid CHECKOUT_TAX_ON_SHIPPING"),
            }
        }

        if let Some(flag) = lookup("CHECKOUT_RATE_CACHE") {
            match flag.parse::<bool>() {
                Ok(f) => self.rate_table.cache_enabled = f,
                Err(_) => warn!(value = %flag, "Ignoring invalid CHECKOUT_RATE_CACHE"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "checkout", "engine")
            .map(|dirs| dirs.config_dir().join("checkout.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The effective pricing rules for `store`.
    pub fn policy_for(&self, store: &str) -> PricingPolicy {
        let overrides = self.stores.get(store);

        PricingPolicy {
            tax_basis: overrides
                .and_then(|o| o.tax_basis)
                .unwrap_or(self.pricing.tax_basis),
            tax_on_shipping: overrides
                .and_then(|o| o.tax_on_shipping)
                .unwrap_or(self.pricing.tax_on_shipping),
            post_processors: overrides
                .and_then(|o| o.post_processors.clone())
                .unwrap_or_else(|| self.pricing.post_processors.clone()),
        }
    }

    pub fn default_store(&self) -> &str {
        &self.pricing.default_store
    }

    pub fn default_language(&self) -> &str {
        &self.pricing.default_language
    }
}
