//! Amount, volume and concentration units as they appear in catalog files.
//!
//! Catalog entries tag every concentration with a unit string such as
//! `"mEq/L"`, `"g/mL"` or `"%"`. Those tags are parsed once into
//! [`ConcentrationUnit`] so that conversions to a per-mL amount are explicit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{TpnError, TpnResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmountUnit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "mg")]
    Milligram,
    #[serde(rename = "mEq")]
    MilliEquivalent,
    #[serde(rename = "mmol")]
    Millimole,
    #[serde(rename = "µmol")]
    Micromole,
    #[serde(rename = "kcal")]
    Kilocalorie,
}

/// Dimension of an amount. Conversions only happen within one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountKind {
    Mass,
    Charge,
    Substance,
    Energy,
}

impl AmountUnit {
    pub fn kind(&self) -> AmountKind {
        match self {
            AmountUnit::Gram | AmountUnit::Milligram => AmountKind::Mass,
            AmountUnit::MilliEquivalent => AmountKind::Charge,
            AmountUnit::Millimole | AmountUnit::Micromole => AmountKind::Substance,
            AmountUnit::Kilocalorie => AmountKind::Energy,
        }
    }

    /// Factor that converts one of `self` into `target`, if both share a dimension.
    pub fn factor_to(&self, target: AmountUnit) -> Option<f64> {
        if self.kind() != target.kind() {
            return None;
        }
        Some(self.base_scale() / target.base_scale())
    }

    // Scale relative to the largest unit of each dimension (g, mEq, mmol, kcal).
    fn base_scale(&self) -> f64 {
        match self {
            AmountUnit::Gram => 1.0,
            AmountUnit::Milligram => 1e-3,
            AmountUnit::MilliEquivalent => 1.0,
            AmountUnit::Millimole => 1.0,
            AmountUnit::Micromole => 1e-3,
            AmountUnit::Kilocalorie => 1.0,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            AmountUnit::Gram => "g",
            AmountUnit::Milligram => "mg",
            AmountUnit::MilliEquivalent => "mEq",
            AmountUnit::Millimole => "mmol",
            AmountUnit::Micromole => "µmol",
            AmountUnit::Kilocalorie => "kcal",
        }
    }
}

impl FromStr for AmountUnit {
    type Err = TpnError;

    fn from_str(s: &str) -> TpnResult<Self> {
        match s.trim() {
            "g" => Ok(AmountUnit::Gram),
            "mg" => Ok(AmountUnit::Milligram),
            "mEq" | "meq" | "mEq." => Ok(AmountUnit::MilliEquivalent),
            "mmol" => Ok(AmountUnit::Millimole),
            "µmol" | "umol" | "μmol" => Ok(AmountUnit::Micromole),
            "kcal" => Ok(AmountUnit::Kilocalorie),
            other => Err(TpnError::InvalidUnit(format!("unknown amount unit '{}'", other))),
        }
    }
}

impl fmt::Display for AmountUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeUnit {
    #[serde(rename = "mL")]
    Milliliter,
    #[serde(rename = "dL")]
    Deciliter,
    #[serde(rename = "L")]
    Liter,
}

impl VolumeUnit {
    pub fn milliliters(&self) -> f64 {
        match self {
            VolumeUnit::Milliliter => 1.0,
            VolumeUnit::Deciliter => 100.0,
            VolumeUnit::Liter => 1000.0,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            VolumeUnit::Milliliter => "mL",
            VolumeUnit::Deciliter => "dL",
            VolumeUnit::Liter => "L",
        }
    }
}

impl FromStr for VolumeUnit {
    type Err = TpnError;

    fn from_str(s: &str) -> TpnResult<Self> {
        match s.trim() {
            "mL" | "ml" => Ok(VolumeUnit::Milliliter),
            "dL" | "dl" => Ok(VolumeUnit::Deciliter),
            "L" | "l" => Ok(VolumeUnit::Liter),
            other => Err(TpnError::InvalidUnit(format!("unknown volume unit '{}'", other))),
        }
    }
}

/// A concentration unit such as mEq/L. Percent (w/v) is stored as g/dL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConcentrationUnit {
    pub amount: AmountUnit,
    pub volume: VolumeUnit,
    percent: bool,
}

impl ConcentrationUnit {
    pub fn new(amount: AmountUnit, volume: VolumeUnit) -> Self {
        Self { amount, volume, percent: false }
    }

    pub fn percent() -> Self {
        Self {
            amount: AmountUnit::Gram,
            volume: VolumeUnit::Deciliter,
            percent: true,
        }
    }

    pub fn per_ml(amount: AmountUnit) -> Self {
        Self::new(amount, VolumeUnit::Milliliter)
    }

    pub fn per_liter(amount: AmountUnit) -> Self {
        Self::new(amount, VolumeUnit::Liter)
    }
}

impl FromStr for ConcentrationUnit {
    type Err = TpnError;

    fn from_str(s: &str) -> TpnResult<Self> {
        let tag = s.trim();
        if tag == "%" || tag.eq_ignore_ascii_case("w/v%") {
            return Ok(Self::percent());
        }
        let (amount, volume) = tag
            .split_once('/')
            .ok_or_else(|| TpnError::InvalidUnit(format!("'{}' is not of the form amount/volume", tag)))?;
        Ok(Self::new(amount.parse()?, volume.parse()?))
    }
}

impl TryFrom<String> for ConcentrationUnit {
    type Error = TpnError;

    fn try_from(value: String) -> TpnResult<Self> {
        value.parse()
    }
}

impl From<ConcentrationUnit> for String {
    fn from(unit: ConcentrationUnit) -> Self {
        unit.to_string()
    }
}

impl fmt::Display for ConcentrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.percent {
            f.write_str("%")
        } else {
            write!(f, "{}/{}", self.amount.symbol(), self.volume.symbol())
        }
    }
}

/// A concentration value together with its unit tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Concentration {
    pub value: f64,
    pub unit: ConcentrationUnit,
}

impl Concentration {
    pub fn new(value: f64, unit: ConcentrationUnit) -> Self {
        Self { value, unit }
    }

    /// Amount per millilitre expressed in `target`, or `None` across dimensions.
    pub fn per_ml_in(&self, target: AmountUnit) -> Option<f64> {
        let factor = self.unit.amount.factor_to(target)?;
        Some(self.value * factor / self.unit.volume.milliliters())
    }
}

impl fmt::Display for Concentration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}
