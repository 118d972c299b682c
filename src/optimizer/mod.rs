pub mod constraints;
pub mod error;
pub mod extract;
pub mod model;
pub mod solver;
pub mod strategies;
pub mod types;

pub use constraints::*;
pub use error::*;
pub use extract::extract;
pub use model::{build_model, ModelBuilder, OptimizationModel};
pub use solver::*;
pub use strategies::*;
pub use types::*;
