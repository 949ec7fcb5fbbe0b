//! # Engine Error Types
//!
//! The errors a caller of [`OrderTotalPipeline::compute`] can observe.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────────┐  ┌──────────────────┐  │
//! │  │  Lookup          │  │  Business outcome    │  │  Failure         │  │
//! │  │                  │  │                      │  │                  │  │
//! │  │  NotFound        │  │  NoApplicable-       │  │  Calculation-    │  │
//! │  │  (unknown store) │  │  ShippingMethod      │  │  Failed          │  │
//! │  └──────────────────┘  └──────────────────────┘  └──────────────────┘  │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────────┐                        │
//! │  │  Invalid         │  │  Config              │                        │
//! │  │  (bad cart etc.) │  │  (checkout.toml)     │                        │
//! │  └──────────────────┘  └──────────────────────┘                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A missing tax rate is never an error: it means zero tax.
//!
//! [`OrderTotalPipeline::compute`]: crate::pipeline::OrderTotalPipeline::compute

use checkout_core::{CoreError, ValidationError};
use checkout_db::DbError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced entity (store) does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Shipping modules exist but none applies to the delivery address.
    #[error("No shipping method applies to delivery country {country} (zone {zone:?})")]
    NoApplicableShippingMethod {
        country: String,
        zone: Option<String>,
    },

    /// The calculation could not complete: persistence failure, plugin
    /// failure or an internal stage error. No partial summary exists.
    #[error("Calculation failed during {stage}: {reason}")]
    CalculationFailed { stage: String, reason: String },

    /// Caller input failed validation.
    #[error("Invalid input: {0}")]
    Invalid(#[from] ValidationError),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn calculation_failed(stage: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        EngineError::CalculationFailed {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps a persistence failure raised while loading `stage`.
    pub fn from_db(stage: &str, err: DbError) -> Self {
        EngineError::calculation_failed(stage, err)
    }

    pub fn is_calculation_failure(&self) -> bool {
        matches!(self, EngineError::CalculationFailed { .. })
    }
}

/// ## Error Mapping
/// ```text
/// CoreError::NoApplicableShippingMethod → NoApplicableShippingMethod
/// CoreError::InvalidStageTransition     → CalculationFailed { stage: "pipeline" }
/// CoreError::Validation                 → Invalid
/// ```
impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NoApplicableShippingMethod { country, zone } => {
                EngineError::NoApplicableShippingMethod { country, zone }
            }
            CoreError::InvalidStageTransition { .. } => {
                EngineError::calculation_failed("pipeline", err)
            }
            CoreError::Validation(v) => EngineError::Invalid(v),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_mapping() {
        let err: EngineError = CoreError::NoApplicableShippingMethod {
            country: "FR".to_string(),
            zone: None,
        }
        .into();
        assert!(matches!(err, EngineError::NoApplicableShippingMethod { ref country, .. } if country == "FR"));

        let err: EngineError = CoreError::InvalidStageTransition {
            from: "started".to_string(),
            to: "finalized".to_string(),
        }
        .into();
        assert!(err.is_calculation_failure());

        let err: EngineError = CoreError::Validation(ValidationError::Required {
            field: "cart items".to_string(),
        })
        .into();
        assert!(matches!(err, EngineError::Invalid(_)));
    }

    #[test]
    fn test_db_failure_is_calculation_failure() {
        let err = EngineError::from_db("load_tax_rates", DbError::PoolExhausted);
        assert_eq!(
            err.to_string(),
            "Calculation failed during load_tax_rates: Connection pool exhausted"
        );
    }
}
