use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::nutrient::Nutrient;
use crate::patient::PatientTargets;
use crate::trace::CalculationTrace;

pub const MINUTES_PER_DAY: f64 = 1440.0;
pub const MG_PER_G: f64 = 1000.0;

/// Absolute daily requirement for one nutrient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub nutrient: Nutrient,
    pub included: bool,
    pub per_kg: Option<f64>, // as entered; GIR for glucose
    pub daily: f64,          // in nutrient.daily_unit()
}

impl Requirement {
    fn excluded(nutrient: Nutrient) -> Self {
        Self {
            nutrient,
            included: false,
            per_kg: None,
            daily: 0.0,
        }
    }

    /// Included with something left to deliver.
    pub fn is_active(&self) -> bool {
        self.included && self.daily > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    entries: BTreeMap<Nutrient, Requirement>,
}

impl Requirements {
    pub fn get(&self, nutrient: Nutrient) -> Requirement {
        self.entries
            .get(&nutrient)
            .copied()
            .unwrap_or_else(|| Requirement::excluded(nutrient))
    }

    pub fn daily(&self, nutrient: Nutrient) -> f64 {
        self.get(nutrient).daily
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.entries.values()
    }

    pub fn active(&self) -> impl Iterator<Item = &Requirement> {
        self.entries.values().filter(|r| r.is_active())
    }
}

/// GIR (mg/kg/min) to grams of glucose per day.
pub fn gir_to_grams_per_day(gir_mg_per_kg_min: f64, weight_kg: f64) -> f64 {
    gir_mg_per_kg_min * weight_kg * MINUTES_PER_DAY / MG_PER_G
}

/// Converts per-kg targets into absolute daily requirements.
///
/// Every nutrient gets a trace line, including the excluded ones, so the trace
/// records which targets were honored.
pub fn resolve_requirements(targets: &PatientTargets, trace: &mut CalculationTrace) -> Requirements {
    let weight = targets.weight_kg;
    let mut entries = BTreeMap::new();

    trace.section("Requirements");

    for nutrient in Nutrient::ALL {
        let requirement = match targets.target(nutrient).effective() {
            Some(value) => {
                let daily = if nutrient == Nutrient::Glucose {
                    let grams = gir_to_grams_per_day(value, weight);
                    trace.line(format!(
                        "GIR: {} mg/kg/min × {} kg × {} min/day ÷ {} = {:.2} g/day",
                        value, weight, MINUTES_PER_DAY, MG_PER_G, grams
                    ));
                    grams
                } else {
                    let amount = value * weight;
                    trace.line(format!(
                        "{}: {} {} × {} kg = {:.2} {}",
                        nutrient.label(),
                        value,
                        nutrient.input_unit_label(),
                        weight,
                        amount,
                        nutrient.daily_unit_label()
                    ));
                    amount
                };
                Requirement {
                    nutrient,
                    included: true,
                    per_kg: Some(value),
                    daily,
                }
            }
            None => {
                trace.line(format!("{}: excluded, not computed", nutrient.input_label()));
                Requirement::excluded(nutrient)
            }
        };

        debug!("Requirement for {}: {:?}", nutrient, requirement);
        entries.insert(nutrient, requirement);
    }

    Requirements { entries }
}
