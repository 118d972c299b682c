//! Re-optimization after exercising a flexibility offer
//!
//! An exercise request runs through
//! `SELECT → WINDOW_SLICE → BASELINE_SOLVE → FLEX_SOLVE → MERGE → REPORT`.
//! The prior plan is only read; both merged results are fresh copies.

pub mod context;
pub mod revenue;
pub mod window;

pub use context::*;
pub use revenue::*;
pub use window::*;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;
use tracing::{debug, info, warn};

use crate::domain::{DispatchPlan, Household};
use crate::flexibility::{
    self, FlexDevice, FlexDirection, FlexibilityConfig, FlexibilityReport,
};
use crate::optimizer::{
    MilpOptimizer, ModelLimits, OptimizationStrategy, PlanningError, PlanningResult,
    SolverBackend, SolverSettings,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReoptimizationConfig {
    /// Length of the rolling window in steps
    pub window_steps: usize,
    /// Offers at or below these magnitudes (kW) are rejected
    pub pv_epsilon_kw: f64,
    pub pv_positive_epsilon_kw: f64,
    pub battery_epsilon_kw: f64,
}

impl Default for ReoptimizationConfig {
    fn default() -> Self {
        Self {
            window_steps: 96,
            pv_epsilon_kw: 1e-6,
            pv_positive_epsilon_kw: 1e-5,
            battery_epsilon_kw: 1e-6,
        }
    }
}

impl ReoptimizationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.window_steps == 0 {
            return Err("reoptimization window_steps must be positive".to_string());
        }
        if self.pv_epsilon_kw < 0.0 || self.pv_positive_epsilon_kw < 0.0 || self.battery_epsilon_kw < 0.0 {
            return Err("reoptimization epsilons cannot be negative".to_string());
        }
        Ok(())
    }

    fn epsilon(&self, device: FlexDevice, direction: FlexDirection) -> f64 {
        match (device, direction) {
            (FlexDevice::Pv, FlexDirection::Negative) => self.pv_epsilon_kw,
            (FlexDevice::Pv, FlexDirection::Positive) => self.pv_positive_epsilon_kw,
            (FlexDevice::Battery, _) => self.battery_epsilon_kw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReoptPhase {
    Select,
    WindowSlice,
    BaselineSolve,
    FlexSolve,
    Merge,
    Report,
}

/// Everything produced by an exercised request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReoptimizationReport {
    pub request: ExerciseRequest,
    pub window: ReoptWindow,
    /// Steps the offer is exercised for, from the request step
    pub inc: usize,
    pub context: ReoptimizationContext,
    /// Offer value (kW, magnitude) and price (per kWh) that were settled
    pub flex_value_kw: f64,
    pub flex_price: f64,
    /// Prior plan with the unconstrained window solve spliced in
    pub baseline: DispatchPlan,
    /// Prior plan with the constrained window solve spliced in
    pub flexed: DispatchPlan,
    /// Flexibility of `flexed`, for chaining further exercises
    pub flexibility: FlexibilityReport,
    pub baseline_revenue: RevenueTable,
    pub flex_revenue: RevenueTable,
    pub settlement: Vec<f64>,
    pub net_gain: f64,
}

#[derive(Debug, Clone)]
pub enum ReoptOutcome {
    /// Nothing to exercise; `plan` is the prior plan, unchanged
    Rejected { plan: DispatchPlan, reason: String },
    Exercised(Box<ReoptimizationReport>),
}

impl ReoptOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ReoptOutcome::Rejected { .. })
    }

    /// The plan to continue from.
    pub fn plan(&self) -> &DispatchPlan {
        match self {
            ReoptOutcome::Rejected { plan, .. } => plan,
            ReoptOutcome::Exercised(report) => &report.flexed,
        }
    }
}

pub struct Reoptimizer {
    planner: MilpOptimizer,
    flexibility: FlexibilityConfig,
    config: ReoptimizationConfig,
}

impl Reoptimizer {
    pub fn new(
        solver: Arc<dyn SolverBackend>,
        settings: SolverSettings,
        limits: ModelLimits,
        flexibility: FlexibilityConfig,
        config: ReoptimizationConfig,
    ) -> Self {
        Self {
            planner: MilpOptimizer::new(solver, settings, limits),
            flexibility,
            config,
        }
    }

    pub fn config(&self) -> &ReoptimizationConfig {
        &self.config
    }

    /// Exercise `request` against `prior`, whose flexibility is `report`.
    ///
    /// Returns [`ReoptOutcome::Rejected`] without solving when the offer
    /// at the requested step is empty.
    pub async fn exercise(
        &self,
        household: &Household,
        prior: &DispatchPlan,
        report: &FlexibilityReport,
        request: ExerciseRequest,
    ) -> PlanningResult<ReoptOutcome> {
        let n = household.step_count();
        if prior.len() != n {
            return Err(PlanningError::InfeasibleSpec(format!(
                "prior plan has {} steps, horizon has {n}",
                prior.len()
            )));
        }
        self.config.validate().map_err(PlanningError::InfeasibleSpec)?;

        // SELECT
        phase(ReoptPhase::Select, &request);
        let s = request.time_step;
        let Some(record) = report.record(request.device, s) else {
            return Ok(reject(prior, format!("step {s} is outside the horizon of {n} steps")));
        };
        let value_kw = record.power(request.direction).abs();
        let price = record.price(request.direction);
        let epsilon = self.config.epsilon(request.device, request.direction);
        if value_kw <= epsilon {
            return Ok(reject(
                prior,
                format!(
                    "no {} {} flexibility at step {s} ({value_kw} kW)",
                    request.device, request.direction
                ),
            ));
        }

        // WINDOW_SLICE
        phase(ReoptPhase::WindowSlice, &request);
        let Some(window) = ReoptWindow::anchored(s, n, self.config.window_steps) else {
            return Ok(reject(prior, format!("no window fits step {s}")));
        };
        let inc = exercise_duration(&request, &window, report, household, prior, &self.flexibility);
        if inc == 0 {
            return Ok(reject(
                prior,
                format!("{} offer at step {s} cannot be sustained for a single step", request.device),
            ));
        }
        let sub = window.slice(household, prior);
        let context = ReoptimizationContext::exercise(
            request,
            window.len,
            inc,
            value_kw,
            &window.reference_export(prior),
        );
        debug!(
            start = window.start,
            len = window.len,
            inc,
            value_kw,
            price,
            "window prepared"
        );

        // BASELINE_SOLVE and FLEX_SOLVE share no state and run side by side
        phase(ReoptPhase::BaselineSolve, &request);
        phase(ReoptPhase::FlexSolve, &request);
        let (baseline_window, flex_window) = tokio::try_join!(
            self.planner.optimize(&sub, None),
            self.planner.optimize(&sub, Some(&context)),
        )?;

        // MERGE
        phase(ReoptPhase::Merge, &request);
        let baseline = prior.spliced(window.start, &baseline_window);
        let flexed = prior.spliced(window.start, &flex_window);

        // REPORT
        phase(ReoptPhase::Report, &request);
        let sph = household.time_base.steps_per_hour();
        let settlement = settlement_series(n, window.start, &context.flex_value, price, sph);
        let baseline_revenue = RevenueTable::of(&baseline, &household.forecast, sph, None);
        let flex_revenue = RevenueTable::of(&flexed, &household.forecast, sph, Some(&settlement));
        let net_gain = flex_revenue.total() - baseline_revenue.total();
        let flexibility = flexibility::compute(&flexed, household, &self.flexibility)?;

        info!(
            step = s,
            device = %request.device,
            direction = %request.direction,
            inc,
            net_gain,
            "flexibility exercised"
        );

        Ok(ReoptOutcome::Exercised(Box::new(ReoptimizationReport {
            request,
            window,
            inc,
            context,
            flex_value_kw: value_kw,
            flex_price: price,
            baseline,
            flexed,
            flexibility,
            baseline_revenue,
            flex_revenue,
            settlement,
            net_gain,
        })))
    }
}

fn phase(phase: ReoptPhase, request: &ExerciseRequest) {
    info!(%phase, step = request.time_step, device = %request.device, "reoptimization phase");
}

fn reject(prior: &DispatchPlan, reason: String) -> ReoptOutcome {
    warn!(%reason, "exercise request rejected");
    ReoptOutcome::Rejected {
        plan: prior.clone(),
        reason,
    }
}
