//! Household multi-energy dispatch planning.
//!
//! [`optimizer`] builds and solves the dispatch MILP for one horizon,
//! [`flexibility`] turns a dispatch plan into per-step flexibility offers and
//! [`reopt`] exercises an offer by re-solving a rolling window.

pub mod config;
pub mod domain;
pub mod flexibility;
pub mod optimizer;
pub mod reopt;
pub mod telemetry;
