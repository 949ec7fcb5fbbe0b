//! # Validation Module
//!
//! Input validation for pricing requests and rate configuration.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Deserialization (serde)                                      │
//! │  └── Shape and type checks, RatePercent range                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Cart rules before a calculation starts                            │
//! │  └── Rate/module codes before an administrative write                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  └── NOT NULL, UNIQUE(store, code), foreign keys                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Cart, Delivery, ShippingModule, TaxRate};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_ORDER_AMOUNT_CENTS, MAX_UNIT_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a business code (SKU, rate code, module code, store code).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only alphanumerics, hyphens, underscores
///
/// ```rust
/// use checkout_core::validation::validate_code;
///
/// assert!(validate_code("sku", "COKE-330").is_ok());
/// assert!(validate_code("sku", "").is_err());
/// assert!(validate_code("sku", "has space").is_err());
/// ```
pub fn validate_code(field: &str, code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if code.len() > 50 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 50,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates an ISO 3166-1 alpha-2 country code (`CA`, `us`).
pub fn validate_country_code(country: &str) -> ValidationResult<()> {
    if country.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "country".to_string(),
        });
    }

    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: "country".to_string(),
            reason: format!("'{}' is not a two-letter country code", country),
        });
    }

    Ok(())
}

/// Validates a delivery address enough to match rates against it.
pub fn validate_delivery(delivery: &Delivery) -> ValidationResult<()> {
    validate_country_code(&delivery.country)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a percentage in 0..=100.
pub fn validate_rate_percent(value: Decimal) -> ValidationResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::OutOfRange {
            field: "rate".to_string(),
            min: 0,
            max: 100,
        });
    }

    Ok(())
}

/// Validates a line quantity (1..=999).
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price (0..=[`MAX_UNIT_PRICE_CENTS`]). Zero is allowed
/// (free items).
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() || price.cents() > MAX_UNIT_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

// =============================================================================
// Aggregate Validators
// =============================================================================

/// Validates a cart before pricing.
///
/// ## Rules
/// - At least one line, at most [`MAX_CART_ITEMS`]
/// - Every line: valid SKU, positive quantity, price within bounds
/// - No SKU appears twice
/// - The subtotal fits in [`MAX_ORDER_AMOUNT_CENTS`]
pub fn validate_cart(cart: &Cart) -> ValidationResult<()> {
    if cart.is_empty() {
        return Err(ValidationError::Required {
            field: "cart items".to_string(),
        });
    }

    if cart.items.len() > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    let mut subtotal = Money::zero();
    for (idx, item) in cart.items.iter().enumerate() {
        validate_code("sku", &item.sku)?;
        validate_quantity(item.quantity)?;
        validate_price(item.unit_price)?;

        subtotal = item
            .unit_price
            .checked_mul(item.quantity)
            .and_then(|line| subtotal.checked_add(line))
            .filter(|total| total.cents() <= MAX_ORDER_AMOUNT_CENTS)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "cart subtotal".to_string(),
                min: 0,
                max: MAX_ORDER_AMOUNT_CENTS,
            })?;

        if cart.items[..idx].iter().any(|other| other.sku == item.sku) {
            return Err(ValidationError::Duplicate {
                field: "sku".to_string(),
                value: item.sku.clone(),
            });
        }
    }

    Ok(())
}

/// Validates a tax rate before it is written.
pub fn validate_tax_rate(rate: &TaxRate) -> ValidationResult<()> {
    validate_code("store", &rate.store)?;
    validate_code("tax rate code", &rate.code)?;
    validate_country_code(&rate.country)?;
    validate_rate_percent(rate.rate.value())?;

    if rate.parent.as_deref() == Some(rate.code.as_str()) {
        return Err(ValidationError::InvalidFormat {
            field: "parent".to_string(),
            reason: "a rate cannot be its own parent".to_string(),
        });
    }

    Ok(())
}

/// Validates a shipping module before it is written.
pub fn validate_shipping_module(module: &ShippingModule) -> ValidationResult<()> {
    validate_code("shipping module code", &module.code)?;

    if module.regions.is_empty() {
        return Err(ValidationError::Required {
            field: "shipping regions".to_string(),
        });
    }

    for region in &module.regions {
        validate_country_code(&region.country)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LineItem, RatePercent, ShippingRegion};
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_code() {
        assert!(validate_code("sku", "COKE-330").is_ok());
        assert!(validate_code("sku", "product_1").is_ok());
        assert!(validate_code("sku", "").is_err());
        assert!(validate_code("sku", "   ").is_err());
        assert!(validate_code("sku", "has space").is_err());
        assert!(validate_code("sku", &"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_country_code() {
        assert!(validate_country_code("CA").is_ok());
        assert!(validate_country_code("us").is_ok());
        assert!(validate_country_code("").is_err());
        assert!(validate_country_code("CAN").is_err());
        assert!(validate_country_code("C1").is_err());
    }

    #[test]
    fn test_validate_rate_percent() {
        assert!(validate_rate_percent(dec!(0)).is_ok());
        assert!(validate_rate_percent(dec!(9.975)).is_ok());
        assert!(validate_rate_percent(dec!(100)).is_ok());
        assert!(validate_rate_percent(dec!(-0.01)).is_err());
        assert!(validate_rate_percent(dec!(101)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_cart() {
        assert!(validate_cart(&Cart::new()).is_err());

        let ok = Cart {
            items: vec![LineItem::new("A", "A", Money::from_cents(100), 1)],
        };
        assert!(validate_cart(&ok).is_ok());

        let negative = Cart {
            items: vec![LineItem::new("A", "A", Money::from_cents(-100), 1)],
        };
        assert!(validate_cart(&negative).is_err());

        let overpriced = Cart {
            items: vec![LineItem::new("BIG", "Big", Money::from_cents(i64::MAX / 2), 3)],
        };
        assert!(matches!(
            validate_cart(&overpriced),
            Err(ValidationError::OutOfRange { ref field, .. }) if field == "price"
        ));

        let at_limit = Cart {
            items: (0..MAX_CART_ITEMS)
                .map(|i| {
                    LineItem::new(
                        format!("SKU-{i}"),
                        "Max",
                        Money::from_cents(MAX_UNIT_PRICE_CENTS),
                        MAX_ITEM_QUANTITY,
                    )
                })
                .collect(),
        };
        assert!(validate_cart(&at_limit).is_ok());
        assert_eq!(at_limit.subtotal().cents(), MAX_ORDER_AMOUNT_CENTS);

        // Built by hand to bypass Cart::add_item merging
        let duplicate = Cart {
            items: vec![
                LineItem::new("A", "A", Money::from_cents(100), 1),
                LineItem::new("A", "A", Money::from_cents(100), 2),
            ],
        };
        assert!(matches!(
            validate_cart(&duplicate),
            Err(ValidationError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_validate_tax_rate() {
        let gst = TaxRate::new("DEFAULT", "GST", "CA", RatePercent::from_bps(500), 1);
        assert!(validate_tax_rate(&gst).is_ok());

        let own_parent = gst.clone().with_parent("GST");
        assert!(validate_tax_rate(&own_parent).is_err());

        let bad_country = TaxRate::new("DEFAULT", "X", "CAN", RatePercent::zero(), 1);
        assert!(validate_tax_rate(&bad_country).is_err());
    }

    #[test]
    fn test_validate_shipping_module() {
        let module = ShippingModule::new("USPS", 1, vec![ShippingRegion::country("US")]);
        assert!(validate_shipping_module(&module).is_ok());

        let nowhere = ShippingModule::new("NOWHERE", 1, Vec::new());
        assert!(validate_shipping_module(&nowhere).is_err());
    }
}
