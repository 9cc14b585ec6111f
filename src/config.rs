use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::RoleAssignment;
use crate::error::{TpnError, TpnResult};

/// Options for one calculation: policy, tolerances and the role mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalculationConfig {
    #[serde(default)]
    pub policy: AllocationPolicy,
    #[serde(default)]
    pub base_volume: BaseVolumeMode,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub roles: RoleAssignment,
    #[serde(default)]
    pub catalog: Option<CatalogPaths>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Cover each shortfall with its designated additive, one nutrient at a time.
    Sequential,
    /// Linear program keeping every nutrient within a band around its target.
    #[default]
    ToleranceBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseVolumeMode {
    /// Base fills the whole budget; additives are carved out of it.
    #[default]
    FullBudget,
    /// Base volume is sized to the glucose requirement; diluent fills the rest.
    GlucoseMatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    pub within: f64,      // accepted relative deviation
    pub degraded: f64,    // accepted with a warning
    pub fatal_ratio: f64, // delivered/target at or above this fails
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            within: 0.10,
            degraded: 0.30,
            fatal_ratio: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPaths {
    pub base_solutions: PathBuf,
    pub additives: PathBuf,
}

impl CalculationConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> TpnResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: CalculationConfig = serde_json::from_str(&content)?;

        // Catalog paths are relative to the configuration file
        if let (Some(catalog), Some(dir)) = (config.catalog.as_mut(), path.as_ref().parent()) {
            if catalog.base_solutions.is_relative() {
                catalog.base_solutions = dir.join(&catalog.base_solutions);
            }
            if catalog.additives.is_relative() {
                catalog.additives = dir.join(&catalog.additives);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn sequential() -> Self {
        Self {
            policy: AllocationPolicy::Sequential,
            ..Self::default()
        }
    }

    pub fn tolerance_band() -> Self {
        Self {
            policy: AllocationPolicy::ToleranceBand,
            ..Self::default()
        }
    }

    pub fn with_base_volume(mut self, mode: BaseVolumeMode) -> Self {
        self.base_volume = mode;
        self
    }

    pub fn validate(&self) -> TpnResult<()> {
        self.tolerance.validate()?;
        self.roles.validate()?;
        Ok(())
    }
}

impl ToleranceConfig {
    pub fn validate(&self) -> TpnResult<()> {
        if !self.within.is_finite() || self.within <= 0.0 || self.within >= 1.0 {
            return Err(TpnError::Validation(format!(
                "Tolerance band must be between 0 and 1, got {}",
                self.within
            )));
        }

        if !self.degraded.is_finite() || self.degraded < self.within || self.degraded >= 1.0 {
            return Err(TpnError::Validation(format!(
                "Degraded band must lie between {} and 1, got {}",
                self.within, self.degraded
            )));
        }

        if !self.fatal_ratio.is_finite() || self.fatal_ratio <= 1.0 + self.degraded {
            return Err(TpnError::Validation(format!(
                "Fatal ratio must exceed {}, got {}",
                1.0 + self.degraded,
                self.fatal_ratio
            )));
        }

        Ok(())
    }
}
