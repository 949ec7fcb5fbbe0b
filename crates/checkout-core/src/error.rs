//! # Error Types
//!
//! Domain-specific error types for checkout-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  checkout-core errors (this file)                                      │
//! │  ├── CoreError        - Matching / state machine failures              │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  checkout-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  checkout-engine errors                                                │
//! │  └── EngineError      - NotFound / NoApplicableShippingMethod /        │
//! │                         CalculationFailed, what callers of compute see │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A missing tax rate is NOT an error anywhere in this hierarchy: it resolves
//! to zero tax so incomplete tax configuration never blocks checkout.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core pricing errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Shipping modules are configured but none applies to the delivery.
    ///
    /// ## When This Occurs
    /// - Store ships to CA/US only, customer delivers to FR
    /// - Every module matching the country is inactive
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout (deliver to FR)
    ///      │
    ///      ▼
    /// select_shipping_module: [CANADAPOST(CA), USPS(US)]
    ///      │
    ///      ▼
    /// NoApplicableShippingMethod { country: "FR", zone: None }
    ///      │
    ///      ▼
    /// UI shows: "We do not ship to this destination"
    /// ```
    #[error("No shipping method applies to delivery country {country} (zone {zone:?})")]
    NoApplicableShippingMethod {
        country: String,
        zone: Option<String>,
    },

    /// A calculation tried to skip or repeat a stage.
    #[error("Invalid calculation stage transition: {from} -> {to}")]
    InvalidStageTransition { from: String, to: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before any rate is resolved.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., country code that is not two letters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., the same SKU twice in one cart).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
