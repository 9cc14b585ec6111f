use log::{debug, info};

use super::{assemble_mix, AdditiveVolumes, Allocation, AllocationContext, AllocationMethod, VOLUME_EPSILON};
use crate::catalog::AdditiveRole;
use crate::config::BaseVolumeMode;
use crate::error::{TpnError, TpnResult};
use crate::nutrient::Nutrient;
use crate::trace::CalculationTrace;

const MAX_ROUNDS: usize = 200;
const CONVERGENCE_TOLERANCE: f64 = 1e-9; // mL
const CAPACITY_TOLERANCE: f64 = 1e-6; // mL

/// How one nutrient's requirement was met.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortfallStep {
    pub nutrient: Nutrient,
    pub requirement: f64,
    pub base_contribution: f64,
    pub cover: Option<Cover>,
}

/// Additive volume drawn to close a shortfall.
#[derive(Debug, Clone, PartialEq)]
pub struct Cover {
    pub additive: String,
    pub per_ml: f64,
    pub volume_ml: f64,
}

impl ShortfallStep {
    pub fn shortfall(&self) -> f64 {
        (self.requirement - self.base_contribution).max(0.0)
    }

    fn describe(&self) -> String {
        let unit = self.nutrient.daily_unit();
        match &self.cover {
            Some(cover) => format!(
                "{}: {:.2} − {:.2} from base = {:.2} {} short; {}: {:.4} ÷ {} {}/mL = {:.2} mL",
                self.nutrient.label(),
                self.requirement,
                self.base_contribution,
                self.shortfall(),
                unit,
                cover.additive,
                self.shortfall(),
                cover.per_ml,
                unit,
                cover.volume_ml
            ),
            None => format!(
                "{}: base supplies {:.2} of {:.2} {}, no additive needed",
                self.nutrient.label(),
                self.base_contribution,
                self.requirement,
                unit
            ),
        }
    }
}

/// Covers every positive shortfall left by `base_volume` of base solution
/// with the designated additive for that nutrient.
pub fn cover_shortfalls(
    ctx: &AllocationContext<'_>,
    base_volume: f64,
    skip_glucose: bool,
) -> TpnResult<(AdditiveVolumes, Vec<ShortfallStep>)> {
    let mut volumes = AdditiveVolumes::default();
    let mut steps = Vec::new();

    for requirement in ctx.requirements.active() {
        let nutrient = requirement.nutrient;
        if skip_glucose && nutrient == Nutrient::Glucose {
            continue;
        }

        let base_contribution = ctx.base.per_ml(nutrient)? * base_volume;
        let shortfall = requirement.daily - base_contribution;

        let cover = if shortfall > 0.0 {
            let role = AdditiveRole::for_nutrient(nutrient);
            let additive = ctx.roles.resolve(role, ctx.additives)?;
            let per_ml = additive.supplying_per_ml(nutrient)?;
            let volume_ml = shortfall / per_ml;
            let name = ctx.roles.name(role);

            volumes.add(name, role, volume_ml);
            Some(Cover {
                additive: name.to_string(),
                per_ml,
                volume_ml,
            })
        } else {
            None
        };

        steps.push(ShortfallStep {
            nutrient,
            requirement: requirement.daily,
            base_contribution,
            cover,
        });
    }

    Ok((volumes, steps))
}

fn capacity_error(required: f64, budget: f64) -> TpnError {
    TpnError::CapacityExceeded {
        required,
        budget,
        excess: required - budget,
    }
}

/// Shortfall-only allocation, one nutrient at a time.
pub fn allocate_sequential(
    ctx: &AllocationContext<'_>,
    mode: BaseVolumeMode,
    trace: &mut CalculationTrace,
) -> TpnResult<Allocation> {
    let allocation = match mode {
        BaseVolumeMode::FullBudget => full_budget(ctx, trace)?,
        BaseVolumeMode::GlucoseMatched => glucose_matched(ctx, trace)?,
    };

    info!(
        "Sequential allocation produced {} components totalling {:.2} mL/day",
        allocation.components.len(),
        allocation.total_volume()
    );
    Ok(allocation)
}

fn full_budget(ctx: &AllocationContext<'_>, trace: &mut CalculationTrace) -> TpnResult<Allocation> {
    let budget = ctx.budget;
    let mut base_volume = budget;
    let mut rounds = 0;

    // Base contributions depend on the final base volume, so iterate to a fixed point
    let (volumes, steps) = loop {
        rounds += 1;
        let (volumes, steps) = cover_shortfalls(ctx, base_volume, false)?;

        let additive_total = volumes.total();
        if additive_total > budget + CAPACITY_TOLERANCE {
            return Err(capacity_error(additive_total, budget));
        }

        let next = (budget - additive_total).max(0.0);
        debug!("Round {}: base {:.9} mL -> {:.9} mL", rounds, base_volume, next);

        if (next - base_volume).abs() < CONVERGENCE_TOLERANCE {
            base_volume = next;
            break (volumes, steps);
        }
        if rounds >= MAX_ROUNDS {
            return Err(TpnError::Allocation(format!(
                "Base volume did not converge after {} rounds (last change {:.3e} mL)",
                rounds,
                (next - base_volume).abs()
            )));
        }
        base_volume = next;
    };

    let additive_total = volumes.total();

    trace.section("Base solution");
    trace.line(format!(
        "{}: occupies the budget left after additives, {:.2} − {:.2} = {:.2} mL/day",
        ctx.base.name, budget, additive_total, base_volume
    ));
    if rounds > 1 {
        trace.line(format!("Converged after {} rounds", rounds));
    }

    trace_additives(trace, &steps, &volumes);

    trace.section("Total volume");
    trace.line(format!(
        "Base {:.2} + additives {:.2} = {:.2} mL/day",
        base_volume,
        additive_total,
        base_volume + additive_total
    ));
    trace.line(format!("Diluent ({}): 0.00 mL/day", ctx.roles.diluent));

    Ok(Allocation {
        components: assemble_mix(&ctx.base.name, base_volume, volumes, &ctx.roles.diluent, 0.0),
        method: AllocationMethod::Sequential {
            base_volume: BaseVolumeMode::FullBudget,
            rounds,
        },
    })
}

fn glucose_matched(ctx: &AllocationContext<'_>, trace: &mut CalculationTrace) -> TpnResult<Allocation> {
    let budget = ctx.budget;
    let glucose = ctx.requirements.get(Nutrient::Glucose);

    trace.section("Base solution");
    let base_volume = if glucose.is_active() {
        let per_ml = ctx.base.per_ml(Nutrient::Glucose)?;
        if per_ml <= 0.0 {
            return Err(TpnError::MissingConcentration {
                component: ctx.base.name.clone(),
                nutrient: Nutrient::Glucose,
            });
        }
        let volume = glucose.daily / per_ml;
        trace.line(format!(
            "{}: {:.4} g/day ÷ {} g/mL = {:.2} mL/day",
            ctx.base.name, glucose.daily, per_ml, volume
        ));
        volume
    } else {
        let reason = if glucose.included { "no glucose requirement" } else { "GIR excluded" };
        trace.line(format!("{}: {}, base volume 0.00 mL/day", ctx.base.name, reason));
        0.0
    };

    let (volumes, steps) = cover_shortfalls(ctx, base_volume, true)?;
    trace_additives(trace, &steps, &volumes);

    let additive_total = volumes.total();
    let required = base_volume + additive_total;
    let diluent = budget - required;
    if diluent < -CAPACITY_TOLERANCE {
        return Err(capacity_error(required, budget));
    }
    let diluent = diluent.max(0.0);

    trace.section("Total volume");
    trace.line(format!(
        "Base {:.2} + additives {:.2} = {:.2} mL/day",
        base_volume, additive_total, required
    ));
    trace.line(format!(
        "Diluent ({}): {:.2} − {:.2} = {:.2} mL/day",
        ctx.roles.diluent, budget, required, diluent
    ));

    Ok(Allocation {
        components: assemble_mix(&ctx.base.name, base_volume, volumes, &ctx.roles.diluent, diluent),
        method: AllocationMethod::Sequential {
            base_volume: BaseVolumeMode::GlucoseMatched,
            rounds: 1,
        },
    })
}

fn trace_additives(trace: &mut CalculationTrace, steps: &[ShortfallStep], volumes: &AdditiveVolumes) {
    trace.section("Additives");
    if steps.is_empty() {
        trace.line("No nutrient targets to cover");
        return;
    }

    for step in steps {
        trace.line(step.describe());
    }

    for entry in volumes.iter().filter(|e| e.volume_ml > VOLUME_EPSILON) {
        trace.line(format!("{} total: {:.2} mL/day", entry.name, entry.volume_ml));
    }
}
