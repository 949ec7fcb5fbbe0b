//! # Domain Types
//!
//! Core domain types used throughout the checkout engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Rate configuration (read-mostly, owned by RateTable)                   │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │    TaxRate      │   │ ShippingModule  │                             │
//! │  │  ─────────────  │   │  ─────────────  │                             │
//! │  │  store, code    │   │  code           │                             │
//! │  │  country, zone? │   │  regions[]      │                             │
//! │  │  language?      │   │  priority       │                             │
//! │  │  rate (Decimal) │   │  active         │                             │
//! │  │  priority       │   └─────────────────┘                             │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  Request context (read-only, supplied by caller)                        │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐           │
//! │  │ Delivery │ │ Customer │ │  Store   │ │ Cart / LineItem  │           │
//! │  └──────────┘ └──────────┘ └──────────┘ └──────────────────┘           │
//! │                                                                         │
//! │  Result (transient, one per calculation)                                │
//! │  ┌────────────────────┐   ┌─────────────────┐                          │
//! │  │   OrderSummary     │──►│   OrderTotal    │ (kind, label, value)     │
//! │  └────────────────────┘   └─────────────────┘                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::validate_rate_percent;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Rate Percent
// =============================================================================

/// A tax or discount percentage held as an exact decimal.
///
/// ## Why Not Basis Points?
/// Quebec's QST is 9.975%, which is 997.5 bps. A Decimal keeps it exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct RatePercent(Decimal);

impl RatePercent {
    /// Creates a percentage, rejecting values outside 0..=100.
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        validate_rate_percent(value)?;
        Ok(RatePercent(value))
    }

    /// Creates a percentage from basis points (825 = 8.25%), capped at 100%.
    pub fn from_bps(bps: u32) -> Self {
        RatePercent(Decimal::new(i64::from(bps.min(10_000)), 2))
    }

    /// Returns the percentage value (9.975 for 9.975%).
    #[inline]
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        RatePercent(Decimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl TryFrom<Decimal> for RatePercent {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        RatePercent::new(value)
    }
}

impl From<RatePercent> for Decimal {
    fn from(rate: RatePercent) -> Self {
        rate.0
    }
}

impl fmt::Display for RatePercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

// =============================================================================
// Delivery / Address
// =============================================================================

/// A postal address. Used as the delivery address, the customer's billing
/// address and the store's own address.
///
/// `zone` is the coded subdivision (`QC`, `ON`, `NY`); `province` is the
/// free-text fallback for countries without configured zones. Rate scopes
/// match against either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,

    #[serde(default)]
    pub zone: Option<String>,

    #[serde(default)]
    pub province: Option<String>,

    #[serde(default)]
    pub city: Option<String>,

    #[serde(default)]
    pub postal_code: Option<String>,

    #[serde(default)]
    pub address_lines: Vec<String>,
}

impl Delivery {
    /// Creates an address with only a country.
    pub fn new(country: impl Into<String>) -> Self {
        Delivery {
            country: country.into(),
            zone: None,
            province: None,
            city: None,
            postal_code: None,
            address_lines: Vec::new(),
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_province(mut self, province: impl Into<String>) -> Self {
        self.province = Some(province.into());
        self
    }

    pub fn with_postal_code(mut self, postal_code: impl Into<String>) -> Self {
        self.postal_code = Some(postal_code.into());
        self
    }

    /// Case-insensitive country comparison.
    pub fn in_country(&self, country: &str) -> bool {
        self.country.eq_ignore_ascii_case(country)
    }

    /// True when `region` names this address's zone code or province.
    pub fn in_region(&self, region: &str) -> bool {
        let zone_hit = self
            .zone
            .as_deref()
            .is_some_and(|z| z.eq_ignore_ascii_case(region));
        let province_hit = self
            .province
            .as_deref()
            .is_some_and(|p| p.trim().eq_ignore_ascii_case(region.trim()));
        zone_hit || province_hit
    }

    /// The zone code, or the province name when no zone is set.
    pub fn region(&self) -> Option<&str> {
        self.zone.as_deref().or(self.province.as_deref())
    }
}

// =============================================================================
// Customer & Store
// =============================================================================

/// The customer being quoted. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,

    /// Preferred language (`en`, `fr`). Falls back to the store default.
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub billing: Option<Delivery>,
}

impl Customer {
    pub fn new(id: impl Into<String>) -> Self {
        Customer {
            id: id.into(),
            language: None,
            billing: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_billing(mut self, billing: Delivery) -> Self {
        self.billing = Some(billing);
        self
    }
}

/// The merchant store the order is placed in. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Business identifier (`DEFAULT`).
    pub code: String,
    pub name: String,
    /// ISO 4217 currency code.
    pub currency: String,
    pub default_language: String,
    /// Where the store is located (used for `TaxBasis::Store`).
    pub address: Delivery,
}

// =============================================================================
// Tax Basis
// =============================================================================

/// Which address is matched against tax rate scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBasis {
    /// Tax follows the delivery address.
    #[default]
    Shipping,
    /// Tax follows the billing address (delivery when none is on file).
    Billing,
    /// Tax follows the store's own address (pickup / origin-based tax).
    Store,
}

impl TaxBasis {
    /// Picks the address to match tax rates against.
    pub fn resolve<'a>(
        &self,
        delivery: &'a Delivery,
        customer: &'a Customer,
        store: &'a Store,
    ) -> &'a Delivery {
        match self {
            TaxBasis::Shipping => delivery,
            TaxBasis::Billing => customer.billing.as_ref().unwrap_or(delivery),
            TaxBasis::Store => &store.address,
        }
    }
}

impl std::str::FromStr for TaxBasis {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shipping" | "delivery" => Ok(TaxBasis::Shipping),
            "billing" => Ok(TaxBasis::Billing),
            "store" | "origin" => Ok(TaxBasis::Store),
            other => Err(ValidationError::InvalidFormat {
                field: "tax_basis".to_string(),
                reason: format!("unknown tax basis '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Tax Rate
// =============================================================================

/// A configured tax percentage for a (store, country, zone, language) scope.
///
/// `zone = None` means "any zone in the country"; `language = None` means
/// "any language". Orders copy `rate` into their [`OrderTotal`] so later
/// edits never rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate {
    pub store: String,
    pub code: String,
    pub country: String,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    pub rate: RatePercent,
    /// Lower evaluates first; one rate is selected per priority tier.
    pub priority: i32,
    /// Only applies when the named rate was also selected.
    #[serde(default)]
    pub parent: Option<String>,
    /// Computed on the base plus previously applied taxes.
    #[serde(default)]
    pub compound: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl TaxRate {
    /// Creates an active, non-compound rate with no zone or language scope.
    pub fn new(
        store: impl Into<String>,
        code: impl Into<String>,
        country: impl Into<String>,
        rate: RatePercent,
        priority: i32,
    ) -> Self {
        TaxRate {
            store: store.into(),
            code: code.into(),
            country: country.into(),
            zone: None,
            language: None,
            rate,
            priority,
            parent: None,
            compound: false,
            active: true,
        }
    }

    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn for_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn compounded(mut self) -> Self {
        self.compound = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

// =============================================================================
// Shipping Module
// =============================================================================

/// One destination a shipping module serves. `zone = None` covers the whole
/// country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRegion {
    pub country: String,
    #[serde(default)]
    pub zone: Option<String>,
}

impl ShippingRegion {
    pub fn country(country: impl Into<String>) -> Self {
        ShippingRegion {
            country: country.into(),
            zone: None,
        }
    }

    pub fn zone(country: impl Into<String>, zone: impl Into<String>) -> Self {
        ShippingRegion {
            country: country.into(),
            zone: Some(zone.into()),
        }
    }
}

/// A shipping provider/strategy selectable for a delivery context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingModule {
    pub code: String,
    pub regions: Vec<ShippingRegion>,
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl ShippingModule {
    pub fn new(code: impl Into<String>, priority: i32, regions: Vec<ShippingRegion>) -> Self {
        ShippingModule {
            code: code.into(),
            regions,
            priority,
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

// =============================================================================
// Cart
// =============================================================================

/// A line in the cart. Price is frozen at the time it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    /// Non-taxable lines (gift cards, exempt goods) stay out of the tax base.
    #[serde(default = "default_true")]
    pub taxable: bool,
    /// Unit weight used for shipping quotes.
    #[serde(default)]
    pub weight_grams: u32,
}

impl LineItem {
    pub fn new(
        sku: impl Into<String>,
        name: impl Into<String>,
        unit_price: Money,
        quantity: i64,
    ) -> Self {
        LineItem {
            sku: sku.into(),
            name: name.into(),
            unit_price,
            quantity,
            taxable: true,
            weight_grams: 0,
        }
    }

    pub fn tax_exempt(mut self) -> Self {
        self.taxable = false;
        self
    }

    pub fn with_weight(mut self, grams: u32) -> Self {
        self.weight_grams = grams;
        self
    }

    /// Unit price × quantity.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// The cart being priced.
///
/// ## Invariants
/// - Lines are unique by `sku` (adding the same SKU increases quantity)
/// - At most [`MAX_CART_ITEMS`] lines, each at most [`MAX_ITEM_QUANTITY`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<LineItem>,
}

impl Cart {
    pub fn new() -> Self {
        Cart { items: Vec::new() }
    }

    /// Builder-style variant of [`Cart::add_item`] for fixtures.
    pub fn with_item(mut self, item: LineItem) -> Result<Self, ValidationError> {
        self.add_item(item)?;
        Ok(self)
    }

    /// Adds a line or merges it into an existing line with the same SKU.
    pub fn add_item(&mut self, item: LineItem) -> Result<(), ValidationError> {
        if let Some(existing) = self.items.iter_mut().find(|i| i.sku == item.sku) {
            let merged = existing.quantity + item.quantity;
            if merged > MAX_ITEM_QUANTITY {
                return Err(ValidationError::OutOfRange {
                    field: "quantity".to_string(),
                    min: 1,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            existing.quantity = merged;
            return Ok(());
        }

        if self.items.len() >= MAX_CART_ITEMS {
            return Err(ValidationError::OutOfRange {
                field: "cart items".to_string(),
                min: 0,
                max: MAX_CART_ITEMS as i64,
            });
        }

        self.items.push(item);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Sum of all line totals (the base amount).
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// Sum of line totals flagged taxable.
    pub fn taxable_subtotal(&self) -> Money {
        self.items
            .iter()
            .filter(|i| i.taxable)
            .map(LineItem::line_total)
            .sum()
    }

    /// Package description handed to shipping quoters.
    pub fn package_details(&self) -> PackageDetails {
        PackageDetails {
            item_count: self.items.len(),
            total_quantity: self.total_quantity(),
            weight_grams: self
                .items
                .iter()
                .map(|i| u64::from(i.weight_grams) * i.quantity.max(0) as u64)
                .sum(),
            declared_value: self.subtotal(),
        }
    }
}

/// What a shipping quoter needs to price a parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub item_count: usize,
    pub total_quantity: i64,
    pub weight_grams: u64,
    pub declared_value: Money,
}

// =============================================================================
// Order Total
// =============================================================================

/// The kind of adjustment an [`OrderTotal`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderTotalKind {
    Discount,
    Shipping,
    Tax,
    /// Any other post-processor adjustment (handling fee, rounding, ...).
    Adjustment,
}

impl OrderTotalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderTotalKind::Discount => "discount",
            OrderTotalKind::Shipping => "shipping",
            OrderTotalKind::Tax => "tax",
            OrderTotalKind::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for OrderTotalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One labelled monetary adjustment applied to an order.
///
/// `value` is signed: discounts are negative so that
/// `subtotal + Σ value == grand total` holds exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotal {
    pub kind: OrderTotalKind,
    /// Machine code (tax rate code, shipping module code, promo code).
    pub code: String,
    /// Display label.
    pub label: String,
    pub value: Money,
    /// Rate snapshot for tax and percentage discounts.
    #[serde(default)]
    pub rate: Option<RatePercent>,
}

impl OrderTotal {
    pub fn tax(code: impl Into<String>, rate: RatePercent, value: Money) -> Self {
        let code = code.into();
        OrderTotal {
            kind: OrderTotalKind::Tax,
            label: code.clone(),
            code,
            value,
            rate: Some(rate),
        }
    }

    pub fn shipping(code: impl Into<String>, value: Money) -> Self {
        let code = code.into();
        OrderTotal {
            kind: OrderTotalKind::Shipping,
            label: code.clone(),
            code,
            value,
            rate: None,
        }
    }

    /// A discount; `amount` is given as a positive reduction.
    pub fn discount(code: impl Into<String>, label: impl Into<String>, amount: Money) -> Self {
        OrderTotal {
            kind: OrderTotalKind::Discount,
            code: code.into(),
            label: label.into(),
            value: -amount.abs(),
            rate: None,
        }
    }

    pub fn adjustment(code: impl Into<String>, label: impl Into<String>, value: Money) -> Self {
        OrderTotal {
            kind: OrderTotalKind::Adjustment,
            code: code.into(),
            label: label.into(),
            value,
            rate: None,
        }
    }

    pub fn with_rate(mut self, rate: RatePercent) -> Self {
        self.rate = Some(rate);
        self
    }
}

// =============================================================================
// Order Summary
// =============================================================================

/// Everything needed to build an [`OrderSummary`].
#[derive(Debug, Clone)]
pub struct SummaryParts {
    pub store_code: String,
    pub customer_id: String,
    pub currency: String,
    pub language: String,
    pub lines: Vec<LineItem>,
    pub subtotal: Money,
    pub totals: Vec<OrderTotal>,
    pub shipping_module: Option<String>,
    pub computed_at: DateTime<Utc>,
}

/// The finalized, immutable result of one order total calculation.
///
/// Fields are private: the grand total is derived at construction, so a
/// summary can never disagree with its own totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    store_code: String,
    customer_id: String,
    currency: String,
    language: String,
    lines: Vec<LineItem>,
    subtotal: Money,
    totals: Vec<OrderTotal>,
    shipping_module: Option<String>,
    grand_total: Money,
    computed_at: DateTime<Utc>,
}

impl OrderSummary {
    /// Seals the parts into a summary, computing the grand total.
    pub fn new(parts: SummaryParts) -> Self {
        let grand_total = parts.subtotal + parts.totals.iter().map(|t| t.value).sum::<Money>();
        OrderSummary {
            store_code: parts.store_code,
            customer_id: parts.customer_id,
            currency: parts.currency,
            language: parts.language,
            lines: parts.lines,
            subtotal: parts.subtotal,
            totals: parts.totals,
            shipping_module: parts.shipping_module,
            grand_total,
            computed_at: parts.computed_at,
        }
    }

    pub fn store_code(&self) -> &str {
        &self.store_code
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    /// Base amount: sum of line totals.
    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    /// Adjustments in the order they were applied.
    pub fn totals(&self) -> &[OrderTotal] {
        &self.totals
    }

    pub fn shipping_module(&self) -> Option<&str> {
        self.shipping_module.as_deref()
    }

    pub fn grand_total(&self) -> Money {
        self.grand_total
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    /// Sum of all adjustments of one kind.
    pub fn total_of(&self, kind: OrderTotalKind) -> Money {
        self.totals
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.value)
            .sum()
    }

    /// Looks up an adjustment by code.
    pub fn find(&self, code: &str) -> Option<&OrderTotal> {
        self.totals.iter().find(|t| t.code == code)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
