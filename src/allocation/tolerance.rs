use log::{debug, info, warn};
use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem, Variable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::sequential::allocate_sequential;
use super::{assemble_mix, AdditiveVolumes, Allocation, AllocationContext, AllocationMethod, ComponentRole, VOLUME_EPSILON};
use crate::catalog::AdditiveRole;
use crate::config::{CalculationConfig, ToleranceConfig};
use crate::error::{TpnError, TpnResult};
use crate::nutrient::Nutrient;
use crate::requirements::{Requirement, Requirements};
use crate::trace::CalculationTrace;

/// Weight on every non-base fraction, so ties go to the base solution.
const BASE_PREFERENCE: f64 = 1e-6;
const CAPACITY_TOLERANCE: f64 = 1e-6; // mL
const BAND_SLACK: f64 = 1e-9;

/// Band the linear program was solved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandLevel {
    Within,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandStatus {
    Within,
    Degraded,
    OutOfBand,
}

impl fmt::Display for BandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BandStatus::Within => "within",
            BandStatus::Degraded => "degraded",
            BandStatus::OutOfBand => "out of band",
        };
        f.write_str(text)
    }
}

/// Delivered amount of one targeted nutrient against its requirement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutrientAssessment {
    pub nutrient: Nutrient,
    pub target: f64,
    pub delivered: f64,
    pub ratio: f64,
    pub status: BandStatus,
}

/// A liquid the program may draw on, with its per-mL amount of each
/// constrained nutrient.
struct Source {
    name: String,
    role: ComponentRole,
    per_ml: Vec<f64>,
}

pub fn allocate_tolerance_band(
    ctx: &AllocationContext<'_>,
    config: &CalculationConfig,
    trace: &mut CalculationTrace,
) -> TpnResult<Allocation> {
    let active: Vec<Requirement> = ctx.requirements.active().copied().collect();
    check_designated_sources(ctx, &active)?;
    let sources = collect_sources(ctx, &active)?;

    trace.section("Tolerance band");
    trace.line(format!(
        "{} candidate liquids, {} constrained nutrients",
        sources.len(),
        active.len()
    ));

    let bands = [
        (BandLevel::Within, config.tolerance.within),
        (BandLevel::Degraded, config.tolerance.degraded),
    ];

    for (level, fraction) in bands {
        match solve_band(ctx.budget, &sources, &active, fraction)? {
            Some(fractions) => {
                if level == BandLevel::Degraded {
                    warn!(
                        "No mix within ±{:.0}% of every target; accepted the ±{:.0}% band",
                        config.tolerance.within * 100.0,
                        fraction * 100.0
                    );
                    trace.line(format!(
                        "Warning: targets reachable only within the degraded ±{:.0}% band",
                        fraction * 100.0
                    ));
                } else {
                    trace.line(format!("Solved within ±{:.0}% of every target", fraction * 100.0));
                }

                let components = build_components(ctx, &sources, &fractions, trace)?;
                info!("Tolerance-band allocation solved in the ±{:.0}% band", fraction * 100.0);
                return Ok(Allocation {
                    components,
                    method: AllocationMethod::ToleranceBand { level, fraction },
                });
            }
            None => {
                debug!("Band ±{:.0}% infeasible", fraction * 100.0);
                trace.line(format!("No mix within ±{:.0}% of every target", fraction * 100.0));
            }
        }
    }

    warn!("Tolerance bands infeasible, falling back to sequential allocation");
    trace.line("Falling back to sequential allocation");

    let fallback = allocate_sequential(ctx, config.base_volume, trace)?;
    let rounds = match fallback.method {
        AllocationMethod::Sequential { rounds, .. } => rounds,
        _ => 1,
    };
    Ok(Allocation {
        components: fallback.components,
        method: AllocationMethod::SequentialFallback { rounds },
    })
}

/// A nutrient the full budget of base cannot cover needs its designated additive.
fn check_designated_sources(ctx: &AllocationContext<'_>, active: &[Requirement]) -> TpnResult<()> {
    for requirement in active {
        let nutrient = requirement.nutrient;
        if ctx.base.per_ml(nutrient)? * ctx.budget >= requirement.daily {
            continue;
        }
        let additive = ctx
            .roles
            .resolve(AdditiveRole::for_nutrient(nutrient), ctx.additives)?;
        additive.supplying_per_ml(nutrient)?;
    }
    Ok(())
}

fn collect_sources(ctx: &AllocationContext<'_>, active: &[Requirement]) -> TpnResult<Vec<Source>> {
    let mut sources = Vec::new();

    let per_ml = active
        .iter()
        .map(|r| ctx.base.per_ml(r.nutrient))
        .collect::<TpnResult<Vec<_>>>()?;
    sources.push(Source {
        name: ctx.base.name.clone(),
        role: ComponentRole::Base,
        per_ml,
    });

    for role in AdditiveRole::SUPPLYING {
        let name = ctx.roles.name(role);
        if sources.iter().any(|s| s.name == name) {
            continue;
        }
        if let Some(additive) = ctx.additives.get(name) {
            let per_ml = active
                .iter()
                .map(|r| additive.per_ml(r.nutrient))
                .collect::<TpnResult<Vec<_>>>()?;
            sources.push(Source {
                name: name.to_string(),
                role: ComponentRole::Additive(role),
                per_ml,
            });
        }
    }

    // Plain water unless the catalog says otherwise
    let per_ml = match ctx.additives.get(&ctx.roles.diluent) {
        Some(diluent) => active
            .iter()
            .map(|r| diluent.per_ml(r.nutrient))
            .collect::<TpnResult<Vec<_>>>()?,
        None => vec![0.0; active.len()],
    };
    sources.push(Source {
        name: ctx.roles.diluent.clone(),
        role: ComponentRole::Diluent,
        per_ml,
    });

    Ok(sources)
}

/// Solves for budget fractions keeping every delivered/required ratio in
/// `[1 - fraction, 1 + fraction]`. Returns `None` when no such mix exists.
fn solve_band(
    budget: f64,
    sources: &[Source],
    active: &[Requirement],
    fraction: f64,
) -> TpnResult<Option<Vec<f64>>> {
    let mut problem = Problem::new(OptimizationDirection::Minimize);

    let shares: Vec<Variable> = sources
        .iter()
        .map(|source| {
            let cost = if source.role == ComponentRole::Base { 0.0 } else { BASE_PREFERENCE };
            problem.add_var(cost, (0.0, f64::INFINITY))
        })
        .collect();

    let mut total = LinearExpr::empty();
    for share in &shares {
        total.add(*share, 1.0);
    }
    problem.add_constraint(total, ComparisonOp::Eq, 1.0);

    for (k, requirement) in active.iter().enumerate() {
        let over = problem.add_var(1.0, (0.0, f64::INFINITY));
        let under = problem.add_var(1.0, (0.0, f64::INFINITY));

        let ratio_terms: Vec<(Variable, f64)> = sources
            .iter()
            .zip(&shares)
            .map(|(source, share)| (*share, source.per_ml[k] * budget / requirement.daily))
            .collect();
        let ratio = || {
            let mut expr = LinearExpr::empty();
            for (share, coeff) in &ratio_terms {
                expr.add(*share, *coeff);
            }
            expr
        };

        // ratio - over + under = 1
        let mut deviation = ratio();
        deviation.add(over, -1.0);
        deviation.add(under, 1.0);
        problem.add_constraint(deviation, ComparisonOp::Eq, 1.0);

        problem.add_constraint(ratio(), ComparisonOp::Le, 1.0 + fraction);
        problem.add_constraint(ratio(), ComparisonOp::Ge, 1.0 - fraction);
    }

    match problem.solve() {
        Ok(solution) => {
            debug!(
                "Band ±{:.0}%: objective {:.6e}",
                fraction * 100.0,
                solution.objective()
            );
            Ok(Some(shares.iter().map(|share| solution[*share].max(0.0)).collect()))
        }
        Err(minilp::Error::Infeasible) => Ok(None),
        Err(minilp::Error::Unbounded) => Err(TpnError::Allocation(
            "Tolerance-band program is unbounded".to_string(),
        )),
    }
}

/// Turns budget fractions into volumes; the diluent takes the residual.
fn build_components(
    ctx: &AllocationContext<'_>,
    sources: &[Source],
    fractions: &[f64],
    trace: &mut CalculationTrace,
) -> TpnResult<Vec<super::MixComponent>> {
    let budget = ctx.budget;
    let mut base_volume = 0.0;
    let mut additives = AdditiveVolumes::default();

    for (source, fraction) in sources.iter().zip(fractions) {
        let mut volume = fraction * budget;
        if volume < VOLUME_EPSILON {
            volume = 0.0;
        }
        match source.role {
            ComponentRole::Base => base_volume = volume,
            ComponentRole::Additive(role) => additives.add(&source.name, role, volume),
            ComponentRole::Diluent => continue,
        }
        trace.line(format!(
            "{}: {:.4} × {:.2} mL/day = {:.2} mL/day",
            source.name, fraction, budget, volume
        ));
    }

    let required = base_volume + additives.total();
    let diluent = budget - required;
    if diluent < -CAPACITY_TOLERANCE {
        return Err(TpnError::CapacityExceeded {
            required,
            budget,
            excess: required - budget,
        });
    }
    let diluent = diluent.max(0.0);
    trace.line(format!(
        "Diluent ({}): {:.2} − {:.2} = {:.2} mL/day",
        ctx.roles.diluent, budget, required, diluent
    ));

    Ok(assemble_mix(&ctx.base.name, base_volume, additives, &ctx.roles.diluent, diluent))
}

/// Grades each targeted nutrient by how far delivery strays from the requirement.
pub fn assess(
    requirements: &Requirements,
    delivered: &BTreeMap<Nutrient, f64>,
    tolerance: &ToleranceConfig,
) -> Vec<NutrientAssessment> {
    requirements
        .active()
        .map(|requirement| {
            let actual = delivered.get(&requirement.nutrient).copied().unwrap_or(0.0);
            let ratio = actual / requirement.daily;
            let deviation = (ratio - 1.0).abs();

            let status = if deviation <= tolerance.within + BAND_SLACK {
                BandStatus::Within
            } else if deviation <= tolerance.degraded + BAND_SLACK {
                BandStatus::Degraded
            } else {
                BandStatus::OutOfBand
            };

            NutrientAssessment {
                nutrient: requirement.nutrient,
                target: requirement.daily,
                delivered: actual,
                ratio,
                status,
            }
        })
        .collect()
}

/// Fails on the first nutrient delivered at `fatal_ratio` times its target or
/// more, or not delivered at all.
pub fn check_fatal(assessments: &[NutrientAssessment], tolerance: &ToleranceConfig) -> TpnResult<()> {
    match assessments
        .iter()
        .find(|a| a.ratio >= tolerance.fatal_ratio || a.ratio <= 0.0)
    {
        Some(a) => Err(TpnError::ToleranceViolation {
            nutrient: a.nutrient,
            target: a.target,
            actual: a.delivered,
            ratio: a.ratio,
        }),
        None => Ok(()),
    }
}
