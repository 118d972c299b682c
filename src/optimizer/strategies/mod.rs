//! Optimization strategies
//!
//! - MILP: mixed-integer linear programming over the whole horizon

pub mod milp;

pub use milp::*;
