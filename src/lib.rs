//! Total parenteral nutrition admixture calculator.
//!
//! Turns per-kg nutrient targets into daily volumes of a base solution,
//! additive concentrates and a diluent that fit the patient's total water
//! intake. Every intermediate figure is kept in a calculation trace returned
//! with the result.

pub mod allocation;
pub mod calculator;
pub mod catalog;
pub mod config;
pub mod error;
pub mod nutrient;
pub mod output;
pub mod patient;
pub mod requirements;
pub mod trace;
pub mod units;

pub use calculator::{compute_allocation, AllocationResult};
pub use catalog::{Additive, AdditiveRole, BaseSolution, RoleAssignment};
pub use config::{AllocationPolicy, BaseVolumeMode, CalculationConfig, ToleranceConfig};
pub use error::{TpnError, TpnResult};
pub use nutrient::Nutrient;
pub use patient::{PatientTargets, Target};
