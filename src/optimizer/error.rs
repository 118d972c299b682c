use thiserror::Error;

/// Failures of the build → solve → extract pipeline. None of them is retried.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// Device or time parameters are inconsistent; caught before solving.
    #[error("infeasible specification: {0}")]
    InfeasibleSpec(String),

    /// The requested solver backend cannot be invoked.
    #[error("solver {solver} is unavailable: {reason}")]
    SolverUnavailable { solver: String, reason: String },

    /// The solver ran but produced no feasible assignment.
    #[error("solver {solver} found no solution: {message}")]
    InfeasibleOrUnbounded { solver: String, message: String },

    /// A blocking solve task panicked or was cancelled.
    #[error("solver task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type PlanningResult<T> = Result<T, PlanningError>;
