use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::path::{Path, PathBuf};

use tpn_calculator::catalog::{find_base_solution, load_additives, load_base_solutions};
use tpn_calculator::output::save_results;
use tpn_calculator::{compute_allocation, AllocationPolicy, CalculationConfig, PatientTargets, TpnError};

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Sequential,
    ToleranceBand,
}

impl From<PolicyArg> for AllocationPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Sequential => AllocationPolicy::Sequential,
            PolicyArg::ToleranceBand => AllocationPolicy::ToleranceBand,
        }
    }
}

#[derive(Parser)]
#[command(name = "tpn-calc")]
#[command(about = "Total parenteral nutrition admixture calculator")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: PathBuf,

    /// Patient target file path
    #[arg(short, long)]
    patient: PathBuf,

    /// Name of the base solution to use
    #[arg(short, long)]
    solution: String,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    /// Override the allocation policy from the configuration
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn catalog_hint(error: &TpnError, config: &Path) {
    if error.is_configuration() {
        warn!("Check the additive catalog and role assignment in {:?}", config);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let mut config = CalculationConfig::from_file(&cli.config)
        .with_context(|| format!("loading configuration {:?}", cli.config))?;
    if let Some(policy) = cli.policy {
        config.policy = policy.into();
    }
    info!("Loaded configuration from {:?} ({:?} policy)", cli.config, config.policy);

    let Some(catalog) = config.catalog.clone() else {
        bail!("configuration {:?} does not name catalog files", cli.config);
    };
    let solutions = load_base_solutions(&catalog.base_solutions)
        .inspect_err(|e| catalog_hint(e, &cli.config))
        .with_context(|| format!("loading base solutions {:?}", catalog.base_solutions))?;
    let additives = load_additives(&catalog.additives)
        .inspect_err(|e| catalog_hint(e, &cli.config))
        .with_context(|| format!("loading additives {:?}", catalog.additives))?;
    info!(
        "Catalog: {} base solutions, {} additives",
        solutions.len(),
        additives.len()
    );

    let base = find_base_solution(&solutions, &cli.solution).inspect_err(|e| catalog_hint(e, &cli.config))?;
    let targets = PatientTargets::from_file(&cli.patient)
        .with_context(|| format!("loading patient targets {:?}", cli.patient))?;

    let result = compute_allocation(&targets, base, &additives, &config)
        .inspect_err(|e| catalog_hint(e, &cli.config))
        .context("allocation failed")?;

    for component in &result.components {
        info!("{:<36} {:>10.2} mL/day", component.name, component.volume_ml);
    }

    std::fs::create_dir_all(&cli.output)?;
    save_results(&result, &cli.output)?;
    info!("Results saved to {:?}", cli.output);

    Ok(())
}
