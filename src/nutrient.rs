use serde::{Deserialize, Serialize};
use std::fmt;

use crate::units::AmountUnit;

/// Every nutrient the calculator can target, allocate and report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Glucose,
    AminoAcids,
    Sodium,
    Potassium,
    Chloride,
    Calcium,
    Magnesium,
    Zinc,
    Phosphorus,
    Fat,
}

impl Nutrient {
    pub const ALL: [Nutrient; 10] = [
        Nutrient::Glucose,
        Nutrient::AminoAcids,
        Nutrient::Sodium,
        Nutrient::Potassium,
        Nutrient::Chloride,
        Nutrient::Calcium,
        Nutrient::Magnesium,
        Nutrient::Zinc,
        Nutrient::Phosphorus,
        Nutrient::Fat,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Nutrient::Glucose => "Glucose",
            Nutrient::AminoAcids => "Amino acids",
            Nutrient::Sodium => "Na",
            Nutrient::Potassium => "K",
            Nutrient::Chloride => "Cl",
            Nutrient::Calcium => "Ca",
            Nutrient::Magnesium => "Mg",
            Nutrient::Zinc => "Zn",
            Nutrient::Phosphorus => "P",
            Nutrient::Fat => "Fat",
        }
    }

    /// Unit in which daily requirements and delivered totals are expressed.
    pub fn daily_unit(&self) -> AmountUnit {
        match self {
            Nutrient::Glucose | Nutrient::AminoAcids | Nutrient::Fat => AmountUnit::Gram,
            Nutrient::Sodium
            | Nutrient::Potassium
            | Nutrient::Chloride
            | Nutrient::Calcium
            | Nutrient::Magnesium => AmountUnit::MilliEquivalent,
            Nutrient::Zinc | Nutrient::Phosphorus => AmountUnit::Millimole,
        }
    }

    pub fn daily_unit_label(&self) -> String {
        format!("{}/day", self.daily_unit())
    }

    /// Unit of the per-kg target. Glucose is prescribed as a GIR.
    pub fn input_unit_label(&self) -> String {
        match self {
            Nutrient::Glucose => "mg/kg/min".to_string(),
            other => format!("{}/kg/day", other.daily_unit()),
        }
    }

    /// Name of the per-kg input as an operator enters it.
    pub fn input_label(&self) -> &'static str {
        match self {
            Nutrient::Glucose => "GIR",
            other => other.label(),
        }
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
