use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::PathBuf;

use tpn_calculator::allocation::{BandStatus, ComponentRole};
use tpn_calculator::catalog::{find_base_solution, load_additives, load_base_solutions};
use tpn_calculator::{
    compute_allocation, Additive, AdditiveRole, BaseSolution, BaseVolumeMode, CalculationConfig, Nutrient,
    PatientTargets, Target, TpnError,
};

fn catalog() -> HashMap<String, Additive> {
    [
        Additive::new("Dextrose 50%")
            .with_per_ml(Nutrient::Glucose, 0.5)
            .with_energy(1.7),
        // 15 mEq Na in 20 mL
        Additive::new("Sodium Phosphate")
            .with_per_ml(Nutrient::Sodium, 15.0 / 20.0)
            .with_per_ml(Nutrient::Phosphorus, 0.5),
        Additive::new("Potassium Chloride")
            .with_per_ml(Nutrient::Potassium, 1.0)
            .with_per_ml(Nutrient::Chloride, 1.0),
        Additive::new("Calcium Gluconate")
            .with_per_ml(Nutrient::Calcium, 0.465)
            .with_per_ml(Nutrient::Magnesium, 0.08),
        Additive::new("Amino Acids with Trace Elements")
            .with_per_ml(Nutrient::AminoAcids, 0.1)
            .with_per_ml(Nutrient::Zinc, 0.0015),
        Additive::new("Lipid Emulsion 20%")
            .with_per_ml(Nutrient::Fat, 0.2)
            .with_energy(2.0),
    ]
    .into_iter()
    .map(|a| (a.name.clone(), a))
    .collect()
}

fn d10() -> BaseSolution {
    BaseSolution::new("D10", 10.0)
}

fn preterm() -> PatientTargets {
    PatientTargets::new(1.33, 110.0)
}

#[test]
fn test_base_alone_meets_gir() {
    let targets = preterm().include(Nutrient::Glucose, 7.0);
    let result = compute_allocation(&targets, &d10(), &catalog(), &CalculationConfig::sequential()).unwrap();

    assert_relative_eq!(result.budget_ml, 146.3, epsilon = 1e-9);
    assert_relative_eq!(result.requirements.daily(Nutrient::Glucose), 13.4064, epsilon = 1e-9);
    assert_eq!(result.components.len(), 1);
    assert_relative_eq!(result.volume_of("D10").unwrap(), 146.3, epsilon = 1e-9);
    assert_eq!(result.additive_components().count(), 0);
    assert!(result.volume_of("Distilled Water").is_none());
    assert_relative_eq!(result.delivered(Nutrient::Glucose), 14.63, epsilon = 1e-9);
}

#[test]
fn test_sodium_from_sodium_phosphate() {
    let targets = preterm()
        .include(Nutrient::Glucose, 7.0)
        .include(Nutrient::Sodium, 2.5);
    let result = compute_allocation(&targets, &d10(), &catalog(), &CalculationConfig::sequential()).unwrap();

    let mix = result.detailed_mix();
    assert_relative_eq!(mix["Sodium Phosphate"], 3.325 / 0.75, epsilon = 1e-9);
    assert_relative_eq!(mix["D10"], 146.3 - 3.325 / 0.75, epsilon = 1e-6);
    assert_relative_eq!(result.total_volume(), 146.3, epsilon = 1e-6);
    assert_relative_eq!(result.delivered(Nutrient::Sodium), 3.325, epsilon = 1e-9);
}

#[test]
fn test_missing_sodium_phosphate_is_a_configuration_error() {
    let targets = preterm().include(Nutrient::Sodium, 2.5);
    let mut additives = catalog();
    additives.remove("Sodium Phosphate");

    for config in [CalculationConfig::sequential(), CalculationConfig::tolerance_band()] {
        let err = compute_allocation(&targets, &d10(), &additives, &config).unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, TpnError::MissingAdditive { role: AdditiveRole::SodiumPhosphate, .. }));
        assert!(err.to_string().contains("Sodium Phosphate"));
    }
}

#[test]
fn test_zero_concentration_names_the_additive() {
    let targets = preterm().include(Nutrient::Magnesium, 0.3);
    let mut additives = catalog();
    additives.insert(
        "Calcium Gluconate".to_string(),
        Additive::new("Calcium Gluconate").with_per_ml(Nutrient::Calcium, 0.465),
    );

    let err = compute_allocation(&targets, &d10(), &additives, &CalculationConfig::sequential()).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "'Calcium Gluconate' has no Mg concentration");
}

#[test]
fn test_oversized_targets_exceed_capacity() {
    let targets = preterm()
        .include(Nutrient::Sodium, 60.0)
        .include(Nutrient::Potassium, 80.0);

    match compute_allocation(&targets, &d10(), &catalog(), &CalculationConfig::sequential()) {
        Err(TpnError::CapacityExceeded { required, budget, excess }) => {
            assert_relative_eq!(budget, 146.3, epsilon = 1e-9);
            assert!(excess > 0.0);
            assert_relative_eq!(required - budget, excess, epsilon = 1e-9);
        }
        other => panic!("expected capacity error, got {:?}", other),
    }
}

#[test]
fn test_everything_excluded_leaves_only_base() {
    let targets = preterm().with(Nutrient::Sodium, Target { value: Some(2.5), included: false });
    let result = compute_allocation(&targets, &d10(), &catalog(), &CalculationConfig::sequential()).unwrap();

    assert_eq!(result.components.len(), 1);
    assert_eq!(result.components[0].role, ComponentRole::Base);
    assert_relative_eq!(result.total_volume(), 146.3, epsilon = 1e-9);
    assert!(result.assessments.is_empty());
    assert!(result.delivery.inputs.is_empty());

    let requirements = result.trace.section_named("Requirements").unwrap();
    assert_eq!(requirements.lines.len(), Nutrient::ALL.len());
    assert!(requirements.lines.iter().all(|l| l.ends_with("excluded, not computed")));
    for requirement in result.requirements.iter() {
        assert_eq!(requirement.daily, 0.0);
    }
}

#[test]
fn test_glucose_matched_mode_uses_diluent() {
    let targets = preterm()
        .include(Nutrient::Glucose, 7.0)
        .include(Nutrient::Sodium, 2.5);
    let config = CalculationConfig::sequential().with_base_volume(BaseVolumeMode::GlucoseMatched);
    let result = compute_allocation(&targets, &d10(), &catalog(), &config).unwrap();

    assert_relative_eq!(result.volume_of("D10").unwrap(), 134.064, epsilon = 1e-9);
    assert_relative_eq!(
        result.diluent_volume(),
        146.3 - 134.064 - 3.325 / 0.75,
        epsilon = 1e-6
    );
    assert_relative_eq!(result.delivered(Nutrient::Glucose), 13.4064, epsilon = 1e-9);
}

#[test]
fn test_shared_additive_accumulates_both_shortfalls() {
    let targets = preterm()
        .include(Nutrient::Sodium, 2.5)
        .include(Nutrient::Phosphorus, 1.5);
    let result = compute_allocation(&targets, &d10(), &catalog(), &CalculationConfig::sequential()).unwrap();

    let expected = 2.5 * 1.33 / 0.75 + 1.5 * 1.33 / 0.5;
    assert_relative_eq!(result.volume_of("Sodium Phosphate").unwrap(), expected, epsilon = 1e-9);
}

#[test]
fn test_sequential_round_trip() {
    let targets = preterm()
        .include(Nutrient::Glucose, 6.0)
        .include(Nutrient::AminoAcids, 2.0)
        .include(Nutrient::Sodium, 3.0)
        .include(Nutrient::Potassium, 2.0)
        .include(Nutrient::Fat, 1.5);
    let additives = catalog();
    let result = compute_allocation(&targets, &d10(), &additives, &CalculationConfig::sequential()).unwrap();

    // D10 carries none of these, so each is delivered by its own additive alone
    for nutrient in [Nutrient::AminoAcids, Nutrient::Sodium, Nutrient::Potassium, Nutrient::Fat] {
        assert_relative_eq!(
            result.delivered(nutrient),
            result.requirements.daily(nutrient),
            epsilon = 1e-6
        );
    }
    assert!(result.delivered(Nutrient::Glucose) >= result.requirements.daily(Nutrient::Glucose) - 1e-6);
}

#[test]
fn test_tolerance_band_within_band() {
    let targets = preterm()
        .include(Nutrient::Glucose, 7.0)
        .include(Nutrient::AminoAcids, 2.5)
        .include(Nutrient::Sodium, 3.0)
        .include(Nutrient::Phosphorus, 2.0)
        .include(Nutrient::Potassium, 2.0)
        .include(Nutrient::Fat, 1.0);
    let result = compute_allocation(&targets, &d10(), &catalog(), &CalculationConfig::default()).unwrap();

    assert_relative_eq!(result.total_volume(), 146.3, epsilon = 1e-6);
    assert_eq!(result.assessments.len(), 6);
    for assessment in &result.assessments {
        assert_eq!(assessment.status, BandStatus::Within, "{:?}", assessment);
    }
}

fn random_targets(rng: &mut StdRng) -> PatientTargets {
    let mut targets = PatientTargets::new(rng.gen_range(0.8..4.0), rng.gen_range(100.0..150.0));
    let ranges = [
        (Nutrient::Glucose, 4.0..8.0),
        (Nutrient::AminoAcids, 1.0..3.0),
        (Nutrient::Sodium, 1.0..4.0),
        (Nutrient::Potassium, 1.0..3.0),
        (Nutrient::Chloride, 1.0..3.0),
        (Nutrient::Calcium, 0.5..2.0),
        (Nutrient::Magnesium, 0.1..0.5),
        (Nutrient::Zinc, 0.001..0.008),
        (Nutrient::Phosphorus, 0.5..2.0),
        (Nutrient::Fat, 0.5..3.0),
    ];
    for (nutrient, range) in ranges {
        let target = Target {
            value: Some(rng.gen_range(range)),
            included: rng.gen_bool(0.5),
        };
        targets = targets.with(nutrient, target);
    }
    targets
}

#[test]
fn test_randomized_invariants() {
    let mut rng = StdRng::seed_from_u64(42);
    let additives = catalog();
    let base = d10();
    let configs = [
        CalculationConfig::sequential(),
        CalculationConfig::sequential().with_base_volume(BaseVolumeMode::GlucoseMatched),
        CalculationConfig::tolerance_band(),
    ];

    let mut successes = 0;
    for _ in 0..60 {
        let targets = random_targets(&mut rng);

        for config in &configs {
            let first = compute_allocation(&targets, &base, &additives, config);
            let second = compute_allocation(&targets, &base, &additives, config);

            let result = match (first, second) {
                (Ok(first), Ok(second)) => {
                    assert_eq!(first, second);
                    first
                }
                (Err(a), Err(b)) => {
                    assert_eq!(a.to_string(), b.to_string());
                    assert!(matches!(
                        a,
                        TpnError::CapacityExceeded { .. } | TpnError::ToleranceViolation { .. }
                    ));
                    continue;
                }
                (a, b) => panic!("identical inputs diverged: {:?} / {:?}", a.is_ok(), b.is_ok()),
            };
            successes += 1;

            assert_relative_eq!(result.total_volume(), targets.twi_budget(), epsilon = 1e-6);
            assert!(result.components.iter().all(|c| c.volume_ml > 0.0));

            for nutrient in Nutrient::ALL {
                if !targets.target(nutrient).included {
                    assert_eq!(result.requirements.daily(nutrient), 0.0);
                    assert!(result.assessment(nutrient).is_none());
                }
            }
        }
    }
    assert!(successes > 0);
}

#[test]
fn test_demo_data_files() {
    let data = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data");
    let config = CalculationConfig::from_file(data.join("config.json")).unwrap();
    let catalog = config.catalog.clone().unwrap();

    let solutions = load_base_solutions(&catalog.base_solutions).unwrap();
    let additives = load_additives(&catalog.additives).unwrap();
    let base = find_base_solution(&solutions, "D10 Maintenance").unwrap();
    let targets = PatientTargets::from_file(data.join("patient.json")).unwrap();

    let result = compute_allocation(&targets, base, &additives, &config).unwrap();
    assert_relative_eq!(result.total_volume(), 146.3, epsilon = 1e-6);
    assert!(result
        .assessments
        .iter()
        .all(|a| a.status == BandStatus::Within));
    assert!(result.energy_kcal() > 0.0);
}
