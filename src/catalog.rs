pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{TpnError, TpnResult};
use crate::nutrient::Nutrient;
use crate::units::{AmountUnit, Concentration, ConcentrationUnit};

pub use loader::{find_base_solution, load_additives, load_base_solutions};

/// A base intravenous solution. Every concentration carries its own unit tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSolution {
    pub name: String,
    pub glucose: Concentration,
    #[serde(default)]
    pub sodium: Option<Concentration>,
    #[serde(default)]
    pub potassium: Option<Concentration>,
    #[serde(default)]
    pub chloride: Option<Concentration>,
    #[serde(default)]
    pub phosphorus: Option<Concentration>,
    #[serde(default)]
    pub calcium: Option<Concentration>,
    #[serde(default)]
    pub magnesium: Option<Concentration>,
    #[serde(default)]
    pub zinc: Option<Concentration>,
    #[serde(default)]
    pub amino_acids: Option<Concentration>,
    #[serde(default)]
    pub fat: Option<Concentration>,
    #[serde(default)]
    pub calories: Option<Concentration>, // kcal/L
}

impl BaseSolution {
    /// A base solution with the given glucose percentage and nothing else.
    pub fn new(name: &str, glucose_percent: f64) -> Self {
        Self {
            name: name.to_string(),
            glucose: Concentration::new(glucose_percent, ConcentrationUnit::percent()),
            sodium: None,
            potassium: None,
            chloride: None,
            phosphorus: None,
            calcium: None,
            magnesium: None,
            zinc: None,
            amino_acids: None,
            fat: None,
            calories: None,
        }
    }

    pub fn with(mut self, nutrient: Nutrient, concentration: Concentration) -> Self {
        let slot = match nutrient {
            Nutrient::Glucose => {
                self.glucose = concentration;
                return self;
            }
            Nutrient::Sodium => &mut self.sodium,
            Nutrient::Potassium => &mut self.potassium,
            Nutrient::Chloride => &mut self.chloride,
            Nutrient::Phosphorus => &mut self.phosphorus,
            Nutrient::Calcium => &mut self.calcium,
            Nutrient::Magnesium => &mut self.magnesium,
            Nutrient::Zinc => &mut self.zinc,
            Nutrient::AminoAcids => &mut self.amino_acids,
            Nutrient::Fat => &mut self.fat,
        };
        *slot = Some(concentration);
        self
    }

    pub fn with_calories(mut self, kcal_per_liter: f64) -> Self {
        self.calories = Some(Concentration::new(
            kcal_per_liter,
            ConcentrationUnit::per_liter(AmountUnit::Kilocalorie),
        ));
        self
    }

    pub fn concentration(&self, nutrient: Nutrient) -> Option<&Concentration> {
        match nutrient {
            Nutrient::Glucose => Some(&self.glucose),
            Nutrient::Sodium => self.sodium.as_ref(),
            Nutrient::Potassium => self.potassium.as_ref(),
            Nutrient::Chloride => self.chloride.as_ref(),
            Nutrient::Phosphorus => self.phosphorus.as_ref(),
            Nutrient::Calcium => self.calcium.as_ref(),
            Nutrient::Magnesium => self.magnesium.as_ref(),
            Nutrient::Zinc => self.zinc.as_ref(),
            Nutrient::AminoAcids => self.amino_acids.as_ref(),
            Nutrient::Fat => self.fat.as_ref(),
        }
    }

    /// Amount of `nutrient` per mL in its daily unit; zero when absent.
    pub fn per_ml(&self, nutrient: Nutrient) -> TpnResult<f64> {
        per_ml_of(&self.name, self.concentration(nutrient), nutrient)
    }

    pub fn energy_per_ml(&self) -> f64 {
        self.calories
            .and_then(|c| c.per_ml_in(AmountUnit::Kilocalorie))
            .unwrap_or(0.0)
    }

    pub fn validate(&self) -> TpnResult<()> {
        let values = Nutrient::ALL
            .iter()
            .map(|n| (n.label(), self.concentration(*n)))
            .chain(std::iter::once(("calorie", self.calories.as_ref())));
        check_concentrations(&self.name, values)
    }
}

/// A concentrate added on top of the base solution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Additive {
    pub name: String,
    #[serde(default)]
    pub glucose: Option<Concentration>,
    #[serde(default)]
    pub amino_acids: Option<Concentration>,
    #[serde(default)]
    pub sodium: Option<Concentration>,
    #[serde(default)]
    pub potassium: Option<Concentration>,
    #[serde(default)]
    pub chloride: Option<Concentration>,
    #[serde(default)]
    pub calcium: Option<Concentration>,
    #[serde(default)]
    pub magnesium: Option<Concentration>,
    #[serde(default)]
    pub zinc: Option<Concentration>,
    #[serde(default)]
    pub phosphorus: Option<Concentration>,
    #[serde(default)]
    pub fat: Option<Concentration>,
    #[serde(default)]
    pub energy: Option<Concentration>, // kcal/mL
}

impl Additive {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            glucose: None,
            amino_acids: None,
            sodium: None,
            potassium: None,
            chloride: None,
            calcium: None,
            magnesium: None,
            zinc: None,
            phosphorus: None,
            fat: None,
            energy: None,
        }
    }

    pub fn with(mut self, nutrient: Nutrient, concentration: Concentration) -> Self {
        let slot = match nutrient {
            Nutrient::Glucose => &mut self.glucose,
            Nutrient::AminoAcids => &mut self.amino_acids,
            Nutrient::Sodium => &mut self.sodium,
            Nutrient::Potassium => &mut self.potassium,
            Nutrient::Chloride => &mut self.chloride,
            Nutrient::Calcium => &mut self.calcium,
            Nutrient::Magnesium => &mut self.magnesium,
            Nutrient::Zinc => &mut self.zinc,
            Nutrient::Phosphorus => &mut self.phosphorus,
            Nutrient::Fat => &mut self.fat,
        };
        *slot = Some(concentration);
        self
    }

    /// Shorthand for a per-mL concentration in the nutrient's daily unit.
    pub fn with_per_ml(self, nutrient: Nutrient, value: f64) -> Self {
        self.with(
            nutrient,
            Concentration::new(value, ConcentrationUnit::per_ml(nutrient.daily_unit())),
        )
    }

    pub fn with_energy(mut self, kcal_per_ml: f64) -> Self {
        self.energy = Some(Concentration::new(
            kcal_per_ml,
            ConcentrationUnit::per_ml(AmountUnit::Kilocalorie),
        ));
        self
    }

    pub fn concentration(&self, nutrient: Nutrient) -> Option<&Concentration> {
        match nutrient {
            Nutrient::Glucose => self.glucose.as_ref(),
            Nutrient::AminoAcids => self.amino_acids.as_ref(),
            Nutrient::Sodium => self.sodium.as_ref(),
            Nutrient::Potassium => self.potassium.as_ref(),
            Nutrient::Chloride => self.chloride.as_ref(),
            Nutrient::Calcium => self.calcium.as_ref(),
            Nutrient::Magnesium => self.magnesium.as_ref(),
            Nutrient::Zinc => self.zinc.as_ref(),
            Nutrient::Phosphorus => self.phosphorus.as_ref(),
            Nutrient::Fat => self.fat.as_ref(),
        }
    }

    pub fn per_ml(&self, nutrient: Nutrient) -> TpnResult<f64> {
        per_ml_of(&self.name, self.concentration(nutrient), nutrient)
    }

    /// Per-mL concentration that must be positive for the additive to cover a shortfall.
    pub fn supplying_per_ml(&self, nutrient: Nutrient) -> TpnResult<f64> {
        let per_ml = self.per_ml(nutrient)?;
        if per_ml > 0.0 && per_ml.is_finite() {
            Ok(per_ml)
        } else {
            Err(TpnError::MissingConcentration {
                component: self.name.clone(),
                nutrient,
            })
        }
    }

    pub fn energy_per_ml(&self) -> f64 {
        self.energy
            .and_then(|c| c.per_ml_in(AmountUnit::Kilocalorie))
            .unwrap_or(0.0)
    }

    pub fn validate(&self) -> TpnResult<()> {
        let values = Nutrient::ALL
            .iter()
            .map(|n| (n.label(), self.concentration(*n)))
            .chain(std::iter::once(("energy", self.energy.as_ref())));
        check_concentrations(&self.name, values)
    }
}

/// Concentrations are amounts per volume; negative or non-finite values are
/// catalog errors.
fn check_concentrations<'a>(
    component: &str,
    values: impl IntoIterator<Item = (&'a str, Option<&'a Concentration>)>,
) -> TpnResult<()> {
    for (label, concentration) in values {
        if let Some(c) = concentration {
            if !c.value.is_finite() || c.value < 0.0 {
                return Err(TpnError::InvalidCatalog(format!(
                    "'{}' has an invalid {} concentration: {} {}",
                    component, label, c.value, c.unit
                )));
            }
        }
    }
    Ok(())
}

fn per_ml_of(source: &str, concentration: Option<&Concentration>, nutrient: Nutrient) -> TpnResult<f64> {
    match concentration {
        None => Ok(0.0),
        Some(c) => c.per_ml_in(nutrient.daily_unit()).ok_or_else(|| TpnError::UnitMismatch {
            nutrient,
            source_name: source.to_string(),
            found: c.unit.to_string(),
            expected: format!("{}/mL", nutrient.daily_unit()),
        }),
    }
}

/// The semantic function an additive fills in a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdditiveRole {
    DextroseConcentrate,
    SodiumPhosphate,
    PotassiumChloride,
    CalciumGluconate,
    AminoAcidTraceElement,
    LipidEmulsion,
    Diluent,
}

impl AdditiveRole {
    /// Roles that supply nutrients, in recipe order.
    pub const SUPPLYING: [AdditiveRole; 6] = [
        AdditiveRole::DextroseConcentrate,
        AdditiveRole::AminoAcidTraceElement,
        AdditiveRole::SodiumPhosphate,
        AdditiveRole::PotassiumChloride,
        AdditiveRole::CalciumGluconate,
        AdditiveRole::LipidEmulsion,
    ];

    /// The role designated to cover a shortfall of `nutrient`.
    pub fn for_nutrient(nutrient: Nutrient) -> AdditiveRole {
        match nutrient {
            Nutrient::Glucose => AdditiveRole::DextroseConcentrate,
            Nutrient::Sodium | Nutrient::Phosphorus => AdditiveRole::SodiumPhosphate,
            Nutrient::Potassium | Nutrient::Chloride => AdditiveRole::PotassiumChloride,
            Nutrient::Calcium | Nutrient::Magnesium => AdditiveRole::CalciumGluconate,
            Nutrient::Zinc | Nutrient::AminoAcids => AdditiveRole::AminoAcidTraceElement,
            Nutrient::Fat => AdditiveRole::LipidEmulsion,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AdditiveRole::DextroseConcentrate => "dextrose concentrate",
            AdditiveRole::SodiumPhosphate => "sodium phosphate",
            AdditiveRole::PotassiumChloride => "potassium chloride",
            AdditiveRole::CalciumGluconate => "calcium gluconate",
            AdditiveRole::AminoAcidTraceElement => "amino acid / trace element",
            AdditiveRole::LipidEmulsion => "lipid emulsion",
            AdditiveRole::Diluent => "diluent",
        }
    }
}

impl fmt::Display for AdditiveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Maps each role to exactly one catalog entry name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleAssignment {
    pub dextrose_concentrate: String,
    pub sodium_phosphate: String,
    pub potassium_chloride: String,
    pub calcium_gluconate: String,
    pub amino_acid_trace_element: String,
    pub lipid_emulsion: String,
    pub diluent: String,
}

impl Default for RoleAssignment {
    fn default() -> Self {
        Self {
            dextrose_concentrate: "Dextrose 50%".to_string(),
            sodium_phosphate: "Sodium Phosphate".to_string(),
            potassium_chloride: "Potassium Chloride".to_string(),
            calcium_gluconate: "Calcium Gluconate".to_string(),
            amino_acid_trace_element: "Amino Acids with Trace Elements".to_string(),
            lipid_emulsion: "Lipid Emulsion 20%".to_string(),
            diluent: "Distilled Water".to_string(),
        }
    }
}

impl RoleAssignment {
    pub fn name(&self, role: AdditiveRole) -> &str {
        match role {
            AdditiveRole::DextroseConcentrate => &self.dextrose_concentrate,
            AdditiveRole::SodiumPhosphate => &self.sodium_phosphate,
            AdditiveRole::PotassiumChloride => &self.potassium_chloride,
            AdditiveRole::CalciumGluconate => &self.calcium_gluconate,
            AdditiveRole::AminoAcidTraceElement => &self.amino_acid_trace_element,
            AdditiveRole::LipidEmulsion => &self.lipid_emulsion,
            AdditiveRole::Diluent => &self.diluent,
        }
    }

    /// Looks up the catalog entry filling `role`.
    pub fn resolve<'a>(
        &self,
        role: AdditiveRole,
        additives: &'a HashMap<String, Additive>,
    ) -> TpnResult<&'a Additive> {
        let name = self.name(role);
        additives.get(name).ok_or_else(|| TpnError::MissingAdditive {
            role,
            name: name.to_string(),
        })
    }

    pub fn validate(&self) -> TpnResult<()> {
        for role in AdditiveRole::SUPPLYING.iter().chain(std::iter::once(&AdditiveRole::Diluent)) {
            if self.name(*role).trim().is_empty() {
                return Err(TpnError::Validation(format!(
                    "No catalog name assigned to role {}",
                    role
                )));
            }
        }

        if let Some(role) = AdditiveRole::SUPPLYING
            .iter()
            .find(|role| self.name(**role) == self.diluent)
        {
            return Err(TpnError::Validation(format!(
                "Diluent '{}' is also assigned to role {}",
                self.diluent, role
            )));
        }

        Ok(())
    }
}
