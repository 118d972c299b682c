//! MILP dispatch strategy
//!
//! Runs the build → solve → extract pipeline for one horizon. Solving is
//! CPU bound, so the async entry point moves it onto the blocking pool.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::{DispatchPlan, Household};
use crate::optimizer::{
    build_model, extract, GoodLpSolver, ModelLimits, OptimizationStrategy, PlanningResult,
    SolverBackend, SolverSettings,
};
use crate::reopt::ReoptimizationContext;

/// Exact household scheduling through a MILP solver
#[derive(Clone)]
pub struct MilpOptimizer {
    solver: Arc<dyn SolverBackend>,
    settings: SolverSettings,
    limits: ModelLimits,
}

impl Default for MilpOptimizer {
    fn default() -> Self {
        Self::new(
            Arc::new(GoodLpSolver),
            SolverSettings::default(),
            ModelLimits::default(),
        )
    }
}

impl MilpOptimizer {
    pub fn new(solver: Arc<dyn SolverBackend>, settings: SolverSettings, limits: ModelLimits) -> Self {
        Self {
            solver,
            settings,
            limits,
        }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn limits(&self) -> &ModelLimits {
        &self.limits
    }

    /// Synchronous pipeline, for callers already off the async runtime.
    #[instrument(skip_all, fields(steps = household.step_count(), solver = %self.settings.kind))]
    pub fn plan_blocking(
        &self,
        household: &Household,
        context: Option<&ReoptimizationContext>,
    ) -> PlanningResult<DispatchPlan> {
        let model = build_model(household, &self.limits, context)?;
        let solved = self.solver.solve(model, &self.settings)?;
        let plan = extract(&solved);
        info!(
            plan_id = %plan.id,
            objective = plan.objective,
            "dispatch plan ready"
        );
        Ok(plan)
    }
}

#[async_trait]
impl OptimizationStrategy for MilpOptimizer {
    async fn optimize(
        &self,
        household: &Household,
        context: Option<&ReoptimizationContext>,
    ) -> PlanningResult<DispatchPlan> {
        let this = self.clone();
        let household = household.clone();
        let context = context.cloned();
        tokio::task::spawn_blocking(move || this.plan_blocking(&household, context.as_ref()))
            .await?
    }
}
