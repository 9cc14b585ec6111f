pub mod sequential;
pub mod tolerance;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::catalog::{Additive, AdditiveRole, BaseSolution, RoleAssignment};
use crate::config::{AllocationPolicy, BaseVolumeMode, CalculationConfig};
use crate::error::TpnResult;
use crate::requirements::Requirements;
use crate::trace::CalculationTrace;

pub use tolerance::{BandLevel, BandStatus, NutrientAssessment};

/// Volumes below this are treated as zero and left out of the mix.
pub const VOLUME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentRole {
    Base,
    Additive(AdditiveRole),
    Diluent,
}

impl fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentRole::Base => f.write_str("base solution"),
            ComponentRole::Additive(role) => write!(f, "{}", role),
            ComponentRole::Diluent => f.write_str("diluent"),
        }
    }
}

/// One liquid in the final admixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixComponent {
    pub name: String,
    pub role: ComponentRole,
    pub volume_ml: f64, // mL/day
}

/// How the volumes were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AllocationMethod {
    Sequential { base_volume: BaseVolumeMode, rounds: usize },
    ToleranceBand { level: BandLevel, fraction: f64 },
    /// The band solve was infeasible and the sequential method was used instead.
    SequentialFallback { rounds: usize },
}

/// Output of the allocation engine before aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub components: Vec<MixComponent>,
    pub method: AllocationMethod,
}

impl Allocation {
    pub fn total_volume(&self) -> f64 {
        self.components.iter().map(|c| c.volume_ml).sum()
    }
}

/// Read-only inputs shared by both policies.
pub struct AllocationContext<'a> {
    pub requirements: &'a Requirements,
    pub base: &'a BaseSolution,
    pub additives: &'a HashMap<String, Additive>,
    pub roles: &'a RoleAssignment,
    pub budget: f64,
}

/// Additive volumes keyed by catalog name. Contributions for the same
/// additive are summed, never overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdditiveVolumes {
    entries: Vec<MixComponent>,
}

impl AdditiveVolumes {
    pub fn add(&mut self, name: &str, role: AdditiveRole, volume_ml: f64) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.volume_ml += volume_ml,
            None => self.entries.push(MixComponent {
                name: name.to_string(),
                role: ComponentRole::Additive(role),
                volume_ml,
            }),
        }
    }

    pub fn get(&self, name: &str) -> f64 {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.volume_ml)
            .unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.volume_ml).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MixComponent> {
        self.entries.iter()
    }
}

/// Lays out base, additives and diluent in recipe order, dropping empty entries.
pub fn assemble_mix(
    base_name: &str,
    base_volume: f64,
    additives: AdditiveVolumes,
    diluent_name: &str,
    diluent_volume: f64,
) -> Vec<MixComponent> {
    let mut components = Vec::with_capacity(additives.entries.len() + 2);

    if base_volume > VOLUME_EPSILON {
        components.push(MixComponent {
            name: base_name.to_string(),
            role: ComponentRole::Base,
            volume_ml: base_volume,
        });
    }

    components.extend(additives.entries.into_iter().filter(|e| e.volume_ml > VOLUME_EPSILON));

    if diluent_volume > VOLUME_EPSILON {
        components.push(MixComponent {
            name: diluent_name.to_string(),
            role: ComponentRole::Diluent,
            volume_ml: diluent_volume,
        });
    }

    components
}

/// Runs the configured allocation policy.
pub fn allocate(
    ctx: &AllocationContext<'_>,
    config: &CalculationConfig,
    trace: &mut CalculationTrace,
) -> TpnResult<Allocation> {
    match config.policy {
        AllocationPolicy::Sequential => sequential::allocate_sequential(ctx, config.base_volume, trace),
        AllocationPolicy::ToleranceBand => tolerance::allocate_tolerance_band(ctx, config, trace),
    }
}
