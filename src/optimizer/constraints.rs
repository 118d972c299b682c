use serde::{Deserialize, Serialize};

/// Tuning of the dispatch model shared by every horizon solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelLimits {
    /// Lower bound of storage content as a fraction of capacity
    pub storage_min_fraction: f64,
    /// Upper bound of storage content as a fraction of capacity
    pub storage_max_fraction: f64,
    /// Storage content required at the last step, fraction of capacity
    pub terminal_min_fraction: f64,
    /// Steps a heat pump or CHP must keep running after switching on
    pub min_run_steps: usize,
    /// Steps a heat pump or CHP must stay off after switching off
    pub min_down_steps: usize,
    /// Cost per kWh of EV state-of-charge shortfall
    pub ev_shortfall_penalty: f64,
    /// Bound on grid import and export (kW)
    pub grid_limit_kw: f64,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            storage_min_fraction: 0.1,
            storage_max_fraction: 0.9,
            terminal_min_fraction: 0.5,
            min_run_steps: 4,
            min_down_steps: 4,
            ev_shortfall_penalty: 1000.0,
            grid_limit_kw: 250_000.0,
        }
    }
}

impl ModelLimits {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.storage_min_fraction)
            || !(0.0..=1.0).contains(&self.storage_max_fraction)
        {
            return Err("storage band fractions must be within [0, 1]".to_string());
        }
        if self.storage_min_fraction > self.storage_max_fraction {
            return Err("storage_min_fraction must be <= storage_max_fraction".to_string());
        }
        if self.terminal_min_fraction > self.storage_max_fraction {
            return Err("terminal_min_fraction cannot exceed storage_max_fraction".to_string());
        }
        if self.ev_shortfall_penalty <= 0.0 {
            return Err("ev_shortfall_penalty must be positive".to_string());
        }
        if self.grid_limit_kw <= 0.0 {
            return Err("grid_limit_kw must be positive".to_string());
        }
        Ok(())
    }
}
