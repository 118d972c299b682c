use async_trait::async_trait;

use super::PlanningResult;
use crate::domain::{DispatchPlan, Household};
use crate::reopt::ReoptimizationContext;

/// Turns a household description into a dispatch plan.
#[async_trait]
pub trait OptimizationStrategy: Send + Sync {
    async fn optimize(
        &self,
        household: &Household,
        context: Option<&ReoptimizationContext>,
    ) -> PlanningResult<DispatchPlan>;
}

pub struct HouseholdOptimizer {
    pub strategy: Box<dyn OptimizationStrategy>,
}

impl HouseholdOptimizer {
    pub fn new(strategy: Box<dyn OptimizationStrategy>) -> Self {
        Self { strategy }
    }

    pub async fn optimize(&self, household: &Household) -> PlanningResult<DispatchPlan> {
        self.strategy.optimize(household, None).await
    }
}
