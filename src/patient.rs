use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{TpnError, TpnResult};
use crate::nutrient::Nutrient;

/// A per-kg target that can be switched off without losing its value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub included: bool,
}

impl Target {
    pub fn included(value: f64) -> Self {
        Self { value: Some(value), included: true }
    }

    pub fn excluded() -> Self {
        Self::default()
    }

    /// The value to honor, or `None` when excluded or absent.
    pub fn effective(&self) -> Option<f64> {
        if self.included {
            self.value
        } else {
            None
        }
    }
}

/// Per-kg/day nutrient targets for one calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientTargets {
    pub weight_kg: f64,
    pub twi_ml_per_kg_day: f64,
    #[serde(default)]
    pub gir: Target, // mg/kg/min
    #[serde(default)]
    pub amino_acids: Target, // g/kg/day
    #[serde(default)]
    pub sodium: Target, // mEq/kg/day
    #[serde(default)]
    pub potassium: Target, // mEq/kg/day
    #[serde(default)]
    pub chloride: Target, // mEq/kg/day
    #[serde(default)]
    pub calcium: Target, // mEq/kg/day
    #[serde(default)]
    pub magnesium: Target, // mEq/kg/day
    #[serde(default)]
    pub zinc: Target, // mmol/kg/day
    #[serde(default)]
    pub phosphorus: Target, // mmol/kg/day
    #[serde(default)]
    pub fat: Target, // g/kg/day
}

impl PatientTargets {
    /// Targets with every nutrient excluded.
    pub fn new(weight_kg: f64, twi_ml_per_kg_day: f64) -> Self {
        Self {
            weight_kg,
            twi_ml_per_kg_day,
            gir: Target::default(),
            amino_acids: Target::default(),
            sodium: Target::default(),
            potassium: Target::default(),
            chloride: Target::default(),
            calcium: Target::default(),
            magnesium: Target::default(),
            zinc: Target::default(),
            phosphorus: Target::default(),
            fat: Target::default(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> TpnResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let targets: PatientTargets = serde_json::from_str(&content)?;
        targets.validate()?;
        Ok(targets)
    }

    /// Sets the target for `nutrient`; for glucose the value is a GIR.
    pub fn with(mut self, nutrient: Nutrient, target: Target) -> Self {
        *self.target_mut(nutrient) = target;
        self
    }

    pub fn include(self, nutrient: Nutrient, value: f64) -> Self {
        self.with(nutrient, Target::included(value))
    }

    pub fn target(&self, nutrient: Nutrient) -> &Target {
        match nutrient {
            Nutrient::Glucose => &self.gir,
            Nutrient::AminoAcids => &self.amino_acids,
            Nutrient::Sodium => &self.sodium,
            Nutrient::Potassium => &self.potassium,
            Nutrient::Chloride => &self.chloride,
            Nutrient::Calcium => &self.calcium,
            Nutrient::Magnesium => &self.magnesium,
            Nutrient::Zinc => &self.zinc,
            Nutrient::Phosphorus => &self.phosphorus,
            Nutrient::Fat => &self.fat,
        }
    }

    fn target_mut(&mut self, nutrient: Nutrient) -> &mut Target {
        match nutrient {
            Nutrient::Glucose => &mut self.gir,
            Nutrient::AminoAcids => &mut self.amino_acids,
            Nutrient::Sodium => &mut self.sodium,
            Nutrient::Potassium => &mut self.potassium,
            Nutrient::Chloride => &mut self.chloride,
            Nutrient::Calcium => &mut self.calcium,
            Nutrient::Magnesium => &mut self.magnesium,
            Nutrient::Zinc => &mut self.zinc,
            Nutrient::Phosphorus => &mut self.phosphorus,
            Nutrient::Fat => &mut self.fat,
        }
    }

    /// Total daily fluid allowance in mL/day.
    pub fn twi_budget(&self) -> f64 {
        self.weight_kg * self.twi_ml_per_kg_day
    }

    pub fn validate(&self) -> TpnResult<()> {
        if !self.weight_kg.is_finite() || self.weight_kg <= 0.0 {
            return Err(TpnError::Validation(format!(
                "Body weight must be positive, got {}",
                self.weight_kg
            )));
        }

        if !self.twi_ml_per_kg_day.is_finite() || self.twi_ml_per_kg_day <= 0.0 {
            return Err(TpnError::Validation(format!(
                "TWI rate must be positive, got {}",
                self.twi_ml_per_kg_day
            )));
        }

        // Excluded targets are ignored whatever value they hold
        for nutrient in Nutrient::ALL {
            if let Some(value) = self.target(nutrient).effective() {
                if !value.is_finite() || value < 0.0 {
                    return Err(TpnError::Validation(format!(
                        "{} target must be non-negative, got {} {}",
                        nutrient.input_label(),
                        value,
                        nutrient.input_unit_label()
                    )));
                }
            }
        }

        Ok(())
    }
}
