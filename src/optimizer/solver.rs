//! Solver backends
//!
//! The model is solved through `good_lp`. Which MILP engine is linked in is a
//! compile-time choice (`microlp`, `cbc`, `highs` features); asking for an
//! engine that was not compiled in is reported as
//! [`PlanningError::SolverUnavailable`] before any work is done.

use good_lp::{Solution, Solver, SolverModel, Variable};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;
use strum::{Display, EnumString};
use tracing::{debug, warn};

use super::model::{Capacities, OptimizationModel, StepInputs};
use super::{PlanningError, PlanningResult};
use crate::domain::TimeBase;

/// MILP engine selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    /// COIN-OR CBC
    Cbc,
    /// HiGHS
    Highs,
    /// Pure Rust branch and bound, always available with the default features
    Microlp,
}

impl SolverKind {
    /// Parse a configured solver name, rejecting unknown names up front.
    pub fn parse(name: &str) -> PlanningResult<Self> {
        SolverKind::from_str(name).map_err(|_| PlanningError::SolverUnavailable {
            solver: name.to_string(),
            reason: "unknown solver name".to_string(),
        })
    }

    pub fn is_compiled_in(self) -> bool {
        match self {
            SolverKind::Cbc => cfg!(feature = "cbc"),
            SolverKind::Highs => cfg!(feature = "highs"),
            SolverKind::Microlp => cfg!(feature = "microlp"),
        }
    }
}

/// Solver selection and limits for one solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub kind: SolverKind,
    pub time_limit_seconds: u64,
    /// Relative MIP gap at which the search stops
    pub mip_gap: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            kind: SolverKind::Microlp,
            time_limit_seconds: 100,
            mip_gap: 0.001,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.time_limit_seconds == 0 {
            return Err("solver time_limit_seconds must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.mip_gap) {
            return Err(format!("solver mip_gap must be in [0, 1), got {}", self.mip_gap));
        }
        Ok(())
    }
}

/// Raw variable values of a solved model, indexed by step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolvedValues {
    pub boiler_heat: Vec<f64>,
    pub pv_generation: Vec<f64>,
    pub grid_import: Vec<f64>,
    pub grid_export: Vec<f64>,
    pub battery_charge: Vec<f64>,
    pub battery_discharge: Vec<f64>,
    pub battery_energy: Vec<f64>,
    pub heat_storage_power: Vec<f64>,
    pub heat_storage_energy: Vec<f64>,
    pub ev_power: Vec<f64>,
    pub ev_energy: Vec<f64>,
    pub hp_run: Vec<f64>,
    pub chp_run: Vec<f64>,
    pub cost: Vec<f64>,
}

/// Output of a successful solve, consumed by the extractor.
#[derive(Debug, Clone)]
pub struct SolvedModel {
    pub values: SolvedValues,
    pub inputs: Vec<StepInputs>,
    pub time_base: TimeBase,
    pub capacities: Capacities,
    /// Sum of the per-step costs
    pub objective: f64,
    pub solver: SolverKind,
}

#[cfg_attr(test, mockall::automock)]
pub trait SolverBackend: Send + Sync {
    fn solve(
        &self,
        model: OptimizationModel,
        settings: &SolverSettings,
    ) -> PlanningResult<SolvedModel>;
}

/// [`SolverBackend`] running the engines linked into `good_lp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver;

impl SolverBackend for GoodLpSolver {
    fn solve(
        &self,
        model: OptimizationModel,
        settings: &SolverSettings,
    ) -> PlanningResult<SolvedModel> {
        let kind = settings.kind;
        if !kind.is_compiled_in() {
            return Err(PlanningError::SolverUnavailable {
                solver: kind.to_string(),
                reason: format!("built without the `{kind}` feature"),
            });
        }
        settings
            .validate()
            .map_err(|reason| PlanningError::SolverUnavailable {
                solver: kind.to_string(),
                reason,
            })?;

        debug!(
            solver = %kind,
            steps = model.step_count(),
            constraints = model.constraint_count(),
            binaries = model.binary_count(),
            "solving dispatch model"
        );
        let started = Instant::now();

        let solved = match kind {
            SolverKind::Cbc => solve_cbc(model, settings),
            SolverKind::Highs => solve_highs(model, settings),
            SolverKind::Microlp => solve_microlp(model, settings),
        }?;

        debug!(
            solver = %kind,
            objective = solved.objective,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "solve finished"
        );
        Ok(solved)
    }
}

#[cfg(feature = "cbc")]
fn solve_cbc(model: OptimizationModel, settings: &SolverSettings) -> PlanningResult<SolvedModel> {
    let seconds = settings.time_limit_seconds.to_string();
    let gap = settings.mip_gap.to_string();
    run(model, good_lp::solvers::coin_cbc::coin_cbc, SolverKind::Cbc, |mut m| {
        m.set_parameter("log", "0");
        m.set_parameter("seconds", &seconds);
        m.set_parameter("ratioGap", &gap);
        m
    })
}

#[cfg(not(feature = "cbc"))]
fn solve_cbc(_: OptimizationModel, _: &SolverSettings) -> PlanningResult<SolvedModel> {
    Err(not_compiled(SolverKind::Cbc))
}

#[cfg(feature = "highs")]
fn solve_highs(model: OptimizationModel, settings: &SolverSettings) -> PlanningResult<SolvedModel> {
    let seconds = settings.time_limit_seconds as f64;
    let gap = settings.mip_gap;
    run(model, good_lp::solvers::highs::highs, SolverKind::Highs, |m| {
        m.set_option("time_limit", seconds)
            .set_option("mip_rel_gap", gap)
    })
}

#[cfg(not(feature = "highs"))]
fn solve_highs(_: OptimizationModel, _: &SolverSettings) -> PlanningResult<SolvedModel> {
    Err(not_compiled(SolverKind::Highs))
}

#[cfg(feature = "microlp")]
fn solve_microlp(model: OptimizationModel, settings: &SolverSettings) -> PlanningResult<SolvedModel> {
    let ignored = microlp_ignored_options(settings);
    if !ignored.is_empty() {
        warn!(
            ignored = ?ignored,
            time_limit_seconds = settings.time_limit_seconds,
            mip_gap = settings.mip_gap,
            "microlp has no time limit or gap option, solving to optimality"
        );
    }
    run(model, good_lp::solvers::microlp::microlp, SolverKind::Microlp, |m| m)
}

/// Configured limits microlp cannot honour.
#[allow(dead_code)]
fn microlp_ignored_options(settings: &SolverSettings) -> Vec<&'static str> {
    let mut ignored = Vec::new();
    if settings.time_limit_seconds > 0 {
        ignored.push("time_limit_seconds");
    }
    if settings.mip_gap > 0.0 {
        ignored.push("mip_gap");
    }
    ignored
}

#[cfg(not(feature = "microlp"))]
fn solve_microlp(_: OptimizationModel, _: &SolverSettings) -> PlanningResult<SolvedModel> {
    Err(not_compiled(SolverKind::Microlp))
}

#[allow(dead_code)]
fn not_compiled(kind: SolverKind) -> PlanningError {
    PlanningError::SolverUnavailable {
        solver: kind.to_string(),
        reason: format!("built without the `{kind}` feature"),
    }
}

#[allow(dead_code)]
fn run<S>(
    model: OptimizationModel,
    solver: S,
    kind: SolverKind,
    tune: impl FnOnce(S::Model) -> S::Model,
) -> PlanningResult<SolvedModel>
where
    S: Solver,
{
    let OptimizationModel {
        problem,
        objective,
        constraints,
        variables,
        inputs,
        time_base,
        capacities,
        ..
    } = model;

    let mut solver_model = tune(problem.minimise(objective).using(solver));
    for c in constraints {
        solver_model = solver_model.with(c);
    }

    let solution = solver_model.solve().map_err(|e| {
        warn!(solver = %kind, error = %e, "solver returned no solution");
        PlanningError::InfeasibleOrUnbounded {
            solver: kind.to_string(),
            message: e.to_string(),
        }
    })?;

    let read = |vars: &[Variable]| -> Vec<f64> { vars.iter().map(|&v| solution.value(v)).collect() };
    let values = SolvedValues {
        boiler_heat: read(&variables.boiler_heat),
        pv_generation: read(&variables.pv_generation),
        grid_import: read(&variables.grid_import),
        grid_export: read(&variables.grid_export),
        battery_charge: read(&variables.battery_charge),
        battery_discharge: read(&variables.battery_discharge),
        battery_energy: read(&variables.battery_energy),
        heat_storage_power: read(&variables.heat_storage_power),
        heat_storage_energy: read(&variables.heat_storage_energy),
        ev_power: read(&variables.ev_power),
        ev_energy: read(&variables.ev_energy),
        hp_run: read(&variables.hp_run),
        chp_run: read(&variables.chp_run),
        cost: read(&variables.cost),
    };
    let objective = values.cost.iter().sum();

    Ok(SolvedModel {
        values,
        inputs,
        time_base,
        capacities,
        objective,
        solver: kind,
    })
}
