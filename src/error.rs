use thiserror::Error;

use crate::catalog::AdditiveRole;
use crate::nutrient::Nutrient;

#[derive(Error, Debug)]
pub enum TpnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Additive '{name}' for role {role} is not defined in the catalog")]
    MissingAdditive { role: AdditiveRole, name: String },

    #[error("'{component}' has no {nutrient} concentration")]
    MissingConcentration { component: String, nutrient: Nutrient },

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Unit mismatch for {nutrient} in '{source_name}': {found} cannot be expressed in {expected}")]
    UnitMismatch {
        nutrient: Nutrient,
        source_name: String,
        found: String,
        expected: String,
    },

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Unknown base solution: {0}")]
    UnknownSolution(String),

    #[error("Total volume {required:.2} mL/day exceeds the TWI budget of {budget:.2} mL/day by {excess:.2} mL/day")]
    CapacityExceeded { required: f64, budget: f64, excess: f64 },

    #[error("{nutrient} delivery out of tolerance: target {target:.3}, actual {actual:.3} ({pct:.0}% of target)", pct = .ratio * 100.0)]
    ToleranceViolation {
        nutrient: Nutrient,
        target: f64,
        actual: f64,
        ratio: f64,
    },

    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("Parameter validation error: {0}")]
    Validation(String),
}

impl TpnError {
    /// Configuration errors point at an incomplete or malformed catalog.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TpnError::MissingAdditive { .. }
                | TpnError::MissingConcentration { .. }
                | TpnError::InvalidUnit(_)
                | TpnError::UnitMismatch { .. }
                | TpnError::UnknownSolution(_)
                | TpnError::InvalidCatalog(_)
        )
    }
}

pub type TpnResult<T> = Result<T, TpnError>;
