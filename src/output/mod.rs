use crate::allocation::{AllocationMethod, BandLevel};
use crate::calculator::AllocationResult;
use crate::error::TpnResult;
use log::info;
use std::fs::File;
use std::path::Path;

pub fn save_results<P: AsRef<Path>>(result: &AllocationResult, output_dir: P) -> TpnResult<()> {
    let output_path = output_dir.as_ref();

    // Component volumes
    save_mix(result, &output_path.join("mix.csv"))?;

    // Delivered nutrients against targets
    save_nutrients(result, &output_path.join("nutrients.csv"))?;

    // Whole result, trace included
    save_result_json(result, &output_path.join("result.json"))?;

    generate_report(result, output_path)?;

    info!("All results saved to {:?}", output_path);
    Ok(())
}

fn save_mix<P: AsRef<Path>>(result: &AllocationResult, path: P) -> TpnResult<()> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(["COMPONENT", "ROLE", "VOLUME_ML_PER_DAY"])?;

    for component in &result.components {
        writer.write_record(&[
            component.name.clone(),
            component.role.to_string(),
            format!("{:.4}", component.volume_ml),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn save_nutrients<P: AsRef<Path>>(result: &AllocationResult, path: P) -> TpnResult<()> {
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record([
        "NUTRIENT", "TOTAL", "UNIT", "PER_KG", "INPUT", "INPUT_UNIT", "STATUS",
    ])?;

    for total in &result.delivery.totals {
        let input = result.delivery.input(total.nutrient);
        let status = result
            .assessment(total.nutrient)
            .map(|a| a.status.to_string())
            .unwrap_or_else(|| "not computed".to_string());

        writer.write_record(&[
            total.nutrient.label().to_string(),
            format!("{:.4}", total.total),
            total.unit.clone(),
            format!("{:.4}", total.per_kg),
            input.map(|i| i.value.to_string()).unwrap_or_default(),
            input.map(|i| i.unit.clone()).unwrap_or_default(),
            status,
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn save_result_json<P: AsRef<Path>>(result: &AllocationResult, path: P) -> TpnResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, result)?;
    Ok(())
}

fn describe_method(method: &AllocationMethod) -> String {
    match method {
        AllocationMethod::Sequential { base_volume, rounds } => {
            format!("sequential, {:?} base volume, {} round(s)", base_volume, rounds)
        }
        AllocationMethod::ToleranceBand { level: BandLevel::Within, fraction } => {
            format!("tolerance band, within ±{:.0}%", fraction * 100.0)
        }
        AllocationMethod::ToleranceBand { level: BandLevel::Degraded, fraction } => {
            format!("tolerance band, degraded to ±{:.0}%", fraction * 100.0)
        }
        AllocationMethod::SequentialFallback { rounds } => {
            format!("sequential fallback after infeasible bands, {} round(s)", rounds)
        }
    }
}

/// Markdown summary of one calculation.
pub fn generate_report<P: AsRef<Path>>(result: &AllocationResult, output_dir: P) -> TpnResult<()> {
    let report_path = output_dir.as_ref().join("report.md");

    let mut mix_rows = String::new();
    for component in &result.components {
        mix_rows.push_str(&format!(
            "| {} | {} | {:.2} |\n",
            component.name, component.role, component.volume_ml
        ));
    }

    let mut nutrient_rows = String::new();
    for total in &result.delivery.totals {
        let (target, status) = match result.assessment(total.nutrient) {
            Some(a) => (format!("{:.2}", a.target), format!("{} ({:.1}%)", a.status, a.ratio * 100.0)),
            None => ("-".to_string(), "not computed".to_string()),
        };
        nutrient_rows.push_str(&format!(
            "| {} | {} | {:.2} | {} | {:.3} | {} |\n",
            total.nutrient.label(),
            target,
            total.total,
            total.unit,
            total.per_kg,
            status
        ));
    }

    let report_content = format!(
        r#"# TPN Admixture Report

Generated {}

## Overview
- **Base solution**: {}
- **Weight**: {} kg
- **Total water intake**: {:.2} mL/day
- **Method**: {}
- **Estimated energy**: {:.1} kcal/day

## Mix
| Component | Role | Volume (mL/day) |
|---|---|---|
{}| **Total** | | {:.2} |

## Nutrients
| Nutrient | Target | Delivered | Unit | Per kg | Status |
|---|---|---|---|---|---|
{}
## Calculation
{}
## Files Generated
- `mix.csv`: Component volumes
- `nutrients.csv`: Delivered nutrients with inputs and tolerance status
- `result.json`: Complete result including the calculation trace
"#,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        result.base_solution,
        result.weight_kg,
        result.budget_ml,
        describe_method(&result.method),
        result.energy_kcal(),
        mix_rows,
        result.total_volume(),
        nutrient_rows,
        result.trace.render(),
    );

    std::fs::write(report_path, report_content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Additive, BaseSolution};
    use crate::config::CalculationConfig;
    use crate::nutrient::Nutrient;
    use crate::patient::PatientTargets;
    use crate::calculator::compute_allocation;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_save_results_writes_all_files() {
        let base = BaseSolution::new("D10", 10.0);
        let additives: HashMap<_, _> = [Additive::new("Sodium Phosphate")
            .with_per_ml(Nutrient::Sodium, 0.75)
            .with_per_ml(Nutrient::Phosphorus, 0.5)]
        .into_iter()
        .map(|a| (a.name.clone(), a))
        .collect();
        let targets = PatientTargets::new(1.33, 110.0)
            .include(Nutrient::Glucose, 7.0)
            .include(Nutrient::Sodium, 2.5);
        let result = compute_allocation(&targets, &base, &additives, &CalculationConfig::sequential()).unwrap();

        let dir = TempDir::new().unwrap();
        save_results(&result, dir.path()).unwrap();

        let mut reader = csv::Reader::from_path(dir.path().join("mix.csv")).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "D10");
        assert_eq!(&rows[1][1], "sodium phosphate");

        let mut reader = csv::Reader::from_path(dir.path().join("nutrients.csv")).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), Nutrient::ALL.len());
        let sodium = rows.iter().find(|r| &r[0] == "Na").unwrap();
        assert_eq!(&sodium[4], "2.5");
        assert_eq!(&sodium[6], "within");
        let zinc = rows.iter().find(|r| &r[0] == "Zn").unwrap();
        assert_eq!(&zinc[6], "not computed");

        let json = std::fs::read_to_string(dir.path().join("result.json")).unwrap();
        let restored: AllocationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.components.len(), result.components.len());
        assert_eq!(restored.method, result.method);
        assert_eq!(restored.trace, result.trace);
        assert!((restored.total_volume() - 146.3).abs() < 1e-6);

        let report = std::fs::read_to_string(dir.path().join("report.md")).unwrap();
        assert!(report.contains("| Sodium Phosphate | sodium phosphate |"));
        assert!(report.contains("1. **Total water intake**"));
    }
}
