use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::summary::DeliverySummary;
use crate::allocation::{AllocationMethod, ComponentRole, MixComponent, NutrientAssessment};
use crate::config::AllocationPolicy;
use crate::nutrient::Nutrient;
use crate::requirements::Requirements;
use crate::trace::CalculationTrace;

/// A complete, internally consistent admixture recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub base_solution: String,
    pub weight_kg: f64,
    pub budget_ml: f64, // mL/day
    pub components: Vec<MixComponent>,
    pub requirements: Requirements,
    pub delivery: DeliverySummary,
    pub assessments: Vec<NutrientAssessment>,
    pub policy: AllocationPolicy,
    pub method: AllocationMethod,
    pub trace: CalculationTrace,
}

impl AllocationResult {
    pub fn volume_of(&self, name: &str) -> Option<f64> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.volume_ml)
    }

    /// Component name to volume.
    pub fn detailed_mix(&self) -> BTreeMap<String, f64> {
        self.components
            .iter()
            .map(|c| (c.name.clone(), c.volume_ml))
            .collect()
    }

    pub fn total_volume(&self) -> f64 {
        self.components.iter().map(|c| c.volume_ml).sum()
    }

    pub fn additive_components(&self) -> impl Iterator<Item = &MixComponent> {
        self.components
            .iter()
            .filter(|c| matches!(c.role, ComponentRole::Additive(_)))
    }

    pub fn diluent_volume(&self) -> f64 {
        self.components
            .iter()
            .filter(|c| c.role == ComponentRole::Diluent)
            .map(|c| c.volume_ml)
            .sum()
    }

    pub fn delivered(&self, nutrient: Nutrient) -> f64 {
        self.delivery.total(nutrient)
    }

    pub fn assessment(&self, nutrient: Nutrient) -> Option<&NutrientAssessment> {
        self.assessments.iter().find(|a| a.nutrient == nutrient)
    }

    pub fn energy_kcal(&self) -> f64 {
        self.delivery.energy_kcal
    }
}
