use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::allocation::{ComponentRole, MixComponent};
use crate::catalog::{Additive, BaseSolution};
use crate::error::TpnResult;
use crate::nutrient::Nutrient;
use crate::patient::PatientTargets;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientTotal {
    pub nutrient: Nutrient,
    pub total: f64, // per day
    pub unit: String,
    pub per_kg: f64,
}

/// A target as it was entered, before conversion to a daily amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAmount {
    pub nutrient: Nutrient,
    pub label: String,
    pub value: f64,
    pub unit: String,
}

/// What the final mix actually delivers, recomputed from volumes and
/// catalog concentrations alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub totals: Vec<NutrientTotal>,
    pub inputs: Vec<InputAmount>,
    pub energy_kcal: f64,
}

impl DeliverySummary {
    pub fn from_mix(
        components: &[MixComponent],
        base: &BaseSolution,
        additives: &HashMap<String, Additive>,
        targets: &PatientTargets,
    ) -> TpnResult<Self> {
        let weight = targets.weight_kg;

        let mut totals = Vec::with_capacity(Nutrient::ALL.len());
        for nutrient in Nutrient::ALL {
            let mut total = 0.0;
            for component in components {
                total += per_ml(component, nutrient, base, additives)? * component.volume_ml;
            }
            totals.push(NutrientTotal {
                nutrient,
                total,
                unit: nutrient.daily_unit_label(),
                per_kg: total / weight,
            });
        }

        let inputs = Nutrient::ALL
            .iter()
            .filter_map(|&nutrient| {
                targets.target(nutrient).effective().map(|value| InputAmount {
                    nutrient,
                    label: nutrient.input_label().to_string(),
                    value,
                    unit: nutrient.input_unit_label(),
                })
            })
            .collect();

        let energy_kcal = components
            .iter()
            .map(|c| {
                let kcal_per_ml = match c.role {
                    ComponentRole::Base => base.energy_per_ml(),
                    _ => additives.get(&c.name).map(|a| a.energy_per_ml()).unwrap_or(0.0),
                };
                kcal_per_ml * c.volume_ml
            })
            .sum();

        Ok(Self {
            totals,
            inputs,
            energy_kcal,
        })
    }

    pub fn total(&self, nutrient: Nutrient) -> f64 {
        self.totals
            .iter()
            .find(|t| t.nutrient == nutrient)
            .map(|t| t.total)
            .unwrap_or(0.0)
    }

    pub fn input(&self, nutrient: Nutrient) -> Option<&InputAmount> {
        self.inputs.iter().find(|i| i.nutrient == nutrient)
    }

    pub fn delivered(&self) -> BTreeMap<Nutrient, f64> {
        self.totals.iter().map(|t| (t.nutrient, t.total)).collect()
    }
}

fn per_ml(
    component: &MixComponent,
    nutrient: Nutrient,
    base: &BaseSolution,
    additives: &HashMap<String, Additive>,
) -> TpnResult<f64> {
    match component.role {
        ComponentRole::Base => base.per_ml(nutrient),
        // An uncatalogued diluent is plain water
        _ => match additives.get(&component.name) {
            Some(additive) => additive.per_ml(nutrient),
            None => Ok(0.0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AdditiveRole;
    use crate::units::Concentration;
    use approx::assert_relative_eq;

    #[test]
    fn test_totals_recomputed_from_volumes() {
        let base = BaseSolution::new("D10", 10.0)
            .with(Nutrient::Sodium, Concentration::new(20.0, "mEq/L".parse().unwrap()))
            .with_calories(340.0);
        let additives: HashMap<_, _> = [
            Additive::new("Sodium Phosphate")
                .with_per_ml(Nutrient::Sodium, 0.75)
                .with_per_ml(Nutrient::Phosphorus, 0.5),
            Additive::new("Lipid Emulsion 20%")
                .with_per_ml(Nutrient::Fat, 0.2)
                .with_energy(2.0),
        ]
        .into_iter()
        .map(|a| (a.name.clone(), a))
        .collect();

        let components = vec![
            MixComponent {
                name: "D10".to_string(),
                role: ComponentRole::Base,
                volume_ml: 100.0,
            },
            MixComponent {
                name: "Sodium Phosphate".to_string(),
                role: ComponentRole::Additive(AdditiveRole::SodiumPhosphate),
                volume_ml: 4.0,
            },
            MixComponent {
                name: "Lipid Emulsion 20%".to_string(),
                role: ComponentRole::Additive(AdditiveRole::LipidEmulsion),
                volume_ml: 10.0,
            },
            MixComponent {
                name: "Distilled Water".to_string(),
                role: ComponentRole::Diluent,
                volume_ml: 6.0,
            },
        ];
        let targets = PatientTargets::new(2.0, 60.0)
            .include(Nutrient::Glucose, 4.0)
            .include(Nutrient::Sodium, 2.5);

        let summary = DeliverySummary::from_mix(&components, &base, &additives, &targets).unwrap();

        assert_relative_eq!(summary.total(Nutrient::Glucose), 10.0, epsilon = 1e-12);
        assert_relative_eq!(summary.total(Nutrient::Sodium), 2.0 + 3.0, epsilon = 1e-12);
        assert_relative_eq!(summary.total(Nutrient::Phosphorus), 2.0, epsilon = 1e-12);
        assert_relative_eq!(summary.total(Nutrient::Fat), 2.0, epsilon = 1e-12);
        assert_eq!(summary.total(Nutrient::Zinc), 0.0);
        assert_relative_eq!(summary.totals[2].per_kg, 2.5, epsilon = 1e-12);
        assert_relative_eq!(summary.energy_kcal, 34.0 + 20.0, epsilon = 1e-9);

        assert_eq!(summary.inputs.len(), 2);
        let gir = summary.input(Nutrient::Glucose).unwrap();
        assert_eq!(gir.label, "GIR");
        assert_eq!(gir.unit, "mg/kg/min");
        assert!(summary.input(Nutrient::Fat).is_none());
    }
}
