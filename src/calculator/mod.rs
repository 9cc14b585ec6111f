pub mod result;
pub mod summary;

use log::{debug, info, warn};
use std::collections::HashMap;

use crate::allocation::tolerance::{assess, check_fatal};
use crate::allocation::{allocate, AllocationContext, BandStatus};
use crate::catalog::{Additive, BaseSolution};
use crate::config::{AllocationPolicy, CalculationConfig};
use crate::error::{TpnError, TpnResult};
use crate::patient::PatientTargets;
use crate::requirements::resolve_requirements;
use crate::trace::CalculationTrace;

pub use result::*;
pub use summary::*;

const CONSERVATION_TOLERANCE: f64 = 1e-6; // mL

/// Computes the admixture for one patient.
///
/// Inputs are only borrowed; either a complete result comes back or an error
/// naming the nutrient or additive at fault.
pub fn compute_allocation(
    targets: &PatientTargets,
    base: &BaseSolution,
    additives: &HashMap<String, Additive>,
    config: &CalculationConfig,
) -> TpnResult<AllocationResult> {
    targets.validate()?;
    config.validate()?;
    base.validate()?;
    for additive in additives.values() {
        additive.validate()?;
    }

    info!(
        "Computing {:?} allocation for {} kg with base '{}'",
        config.policy, targets.weight_kg, base.name
    );

    let mut trace = CalculationTrace::new();
    let budget = targets.twi_budget();

    trace.section("Total water intake");
    trace.line(format!(
        "{} mL/kg/day × {} kg = {:.2} mL/day",
        targets.twi_ml_per_kg_day, targets.weight_kg, budget
    ));

    let requirements = resolve_requirements(targets, &mut trace);

    let ctx = AllocationContext {
        requirements: &requirements,
        base,
        additives,
        roles: &config.roles,
        budget,
    };
    let allocation = allocate(&ctx, config, &mut trace)?;

    let total = allocation.total_volume();
    if (total - budget).abs() > CONSERVATION_TOLERANCE {
        return Err(TpnError::Allocation(format!(
            "Mix totals {:.6} mL/day against a budget of {:.6} mL/day",
            total, budget
        )));
    }

    trace.section("Final mix");
    for component in &allocation.components {
        trace.line(format!(
            "{} ({}): {:.2} mL/day",
            component.name, component.role, component.volume_ml
        ));
    }
    trace.line(format!("Total: {:.2} mL/day", total));

    let delivery = DeliverySummary::from_mix(&allocation.components, base, additives, targets)?;
    let assessments = assess(&requirements, &delivery.delivered(), &config.tolerance);

    trace.section("Delivered");
    for nutrient_total in &delivery.totals {
        let unit = nutrient_total.nutrient.daily_unit();
        let mut line = format!(
            "{}: {:.2} {}/day ({:.3} {}/kg/day)",
            nutrient_total.nutrient.label(),
            nutrient_total.total,
            unit,
            nutrient_total.per_kg,
            unit
        );
        if let Some(a) = assessments.iter().find(|a| a.nutrient == nutrient_total.nutrient) {
            line.push_str(&format!(", {:.1}% of target, {}", a.ratio * 100.0, a.status));
        }
        trace.line(line);
    }
    trace.line(format!("Energy: {:.1} kcal/day", delivery.energy_kcal));

    for a in assessments.iter().filter(|a| a.status != BandStatus::Within) {
        warn!(
            "{} delivered at {:.1}% of target ({})",
            a.nutrient,
            a.ratio * 100.0,
            a.status
        );
    }

    if config.policy == AllocationPolicy::ToleranceBand {
        check_fatal(&assessments, &config.tolerance)?;
    }

    debug!("Allocation method: {:?}", allocation.method);
    info!(
        "Allocated {} components, {:.2} mL/day",
        allocation.components.len(),
        total
    );

    Ok(AllocationResult {
        base_solution: base.name.clone(),
        weight_kg: targets.weight_kg,
        budget_ml: budget,
        components: allocation.components,
        requirements,
        delivery,
        assessments,
        policy: config.policy,
        method: allocation.method,
        trace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{AllocationMethod, BandLevel};
    use crate::nutrient::Nutrient;
    use approx::assert_relative_eq;

    fn catalog() -> HashMap<String, Additive> {
        [
            Additive::new("Dextrose 50%").with_per_ml(Nutrient::Glucose, 0.5),
            Additive::new("Sodium Phosphate")
                .with_per_ml(Nutrient::Sodium, 0.75)
                .with_per_ml(Nutrient::Phosphorus, 0.5),
            Additive::new("Potassium Chloride")
                .with_per_ml(Nutrient::Potassium, 1.0)
                .with_per_ml(Nutrient::Chloride, 1.0),
            Additive::new("Lipid Emulsion 20%")
                .with_per_ml(Nutrient::Fat, 0.2)
                .with_energy(2.0),
        ]
        .into_iter()
        .map(|a| (a.name.clone(), a))
        .collect()
    }

    #[test]
    fn test_trace_sections_in_order() {
        let targets = PatientTargets::new(1.33, 110.0)
            .include(Nutrient::Glucose, 7.0)
            .include(Nutrient::Sodium, 2.5);
        let base = BaseSolution::new("D10", 10.0);

        let result = compute_allocation(&targets, &base, &catalog(), &CalculationConfig::sequential()).unwrap();

        let titles: Vec<_> = result.trace.sections().iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Total water intake",
                "Requirements",
                "Base solution",
                "Additives",
                "Total volume",
                "Final mix",
                "Delivered"
            ]
        );
        assert!(result
            .trace
            .lines()
            .any(|l| l == "110 mL/kg/day × 1.33 kg = 146.30 mL/day"));
    }

    #[test]
    fn test_tolerance_band_result() {
        let targets = PatientTargets::new(2.0, 120.0)
            .include(Nutrient::Glucose, 6.0)
            .include(Nutrient::Potassium, 2.0)
            .include(Nutrient::Fat, 1.0);
        let base = BaseSolution::new("D10", 10.0);

        let result = compute_allocation(&targets, &base, &catalog(), &CalculationConfig::default()).unwrap();

        assert_eq!(
            result.method,
            AllocationMethod::ToleranceBand { level: BandLevel::Within, fraction: 0.10 }
        );
        assert_relative_eq!(result.total_volume(), 240.0, epsilon = 1e-6);
        for assessment in &result.assessments {
            assert_eq!(assessment.status, BandStatus::Within);
        }
        assert_relative_eq!(result.delivered(Nutrient::Fat), 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.volume_of("Lipid Emulsion 20%").unwrap(), 10.0, epsilon = 1e-6);
        // Only the lipid carries an energy density here
        assert_relative_eq!(result.energy_kcal(), 20.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fatal_violation_only_under_tolerance_band() {
        // Sodium phosphate cannot satisfy both targets, the fallback overshoots sodium
        let targets = PatientTargets::new(1.0, 100.0)
            .include(Nutrient::Sodium, 3.0)
            .include(Nutrient::Phosphorus, 5.0);
        let base = BaseSolution::new("D10", 10.0);

        let err = compute_allocation(&targets, &base, &catalog(), &CalculationConfig::default()).unwrap_err();
        match err {
            TpnError::ToleranceViolation { nutrient, target, actual, .. } => {
                assert_eq!(nutrient, Nutrient::Sodium);
                assert_relative_eq!(target, 3.0, epsilon = 1e-9);
                assert_relative_eq!(actual, 10.5, epsilon = 1e-9);
            }
            other => panic!("expected tolerance violation, got {:?}", other),
        }

        let result = compute_allocation(&targets, &base, &catalog(), &CalculationConfig::sequential()).unwrap();
        assert_eq!(
            result.assessment(Nutrient::Sodium).unwrap().status,
            BandStatus::OutOfBand
        );
    }

    #[test]
    fn test_invalid_targets_rejected_before_allocation() {
        let targets = PatientTargets::new(0.0, 110.0);
        let base = BaseSolution::new("D10", 10.0);
        let err = compute_allocation(&targets, &base, &catalog(), &CalculationConfig::default()).unwrap_err();
        assert!(matches!(err, TpnError::Validation(_)));
    }

    #[test]
    fn test_negative_catalog_values_rejected() {
        let targets = PatientTargets::new(1.33, 110.0).include(Nutrient::Glucose, 7.0);
        let base = BaseSolution::new("D10", -10.0);
        let err = compute_allocation(&targets, &base, &catalog(), &CalculationConfig::default()).unwrap_err();
        assert!(matches!(err, TpnError::InvalidCatalog(_)));
        assert!(err.is_configuration());
    }
}
