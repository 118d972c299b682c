use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TimeBase;

/// Scheduled operation of every device for one time step.
///
/// Powers in kW, energies in kWh, state of charge in percent of capacity.
/// Battery `charge`/`discharge` are the two non-negative legs as seen from
/// the AC side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchStep {
    pub hp_on: bool,
    pub hp_electric_kw: f64,
    pub hp_heat_kw: f64,
    pub hp_cop: f64,

    pub chp_on: bool,
    pub chp_electric_kw: f64,
    pub chp_heat_kw: f64,
    pub chp_gas_kw: f64,

    pub boiler_heat_kw: f64,

    /// Positive while the tank is charging
    pub heat_storage_power_kw: f64,
    pub heat_storage_energy_kwh: f64,
    pub heat_storage_soc_percent: f64,
    pub heat_load_kw: f64,

    pub pv_power_kw: f64,
    pub pv_to_demand_kw: f64,
    pub pv_to_grid_kw: f64,
    pub pv_to_battery_kw: f64,

    pub grid_import_kw: f64,
    pub grid_export_kw: f64,
    pub electric_load_kw: f64,

    pub battery_charge_kw: f64,
    pub battery_discharge_kw: f64,
    pub grid_to_battery_kw: f64,
    pub battery_energy_kwh: f64,
    pub battery_soc_percent: f64,

    pub ev_power_kw: f64,
    pub ev_soc_percent: f64,

    /// Monetary cost of this step including penalties
    pub cost: f64,
    /// Average price of the electricity supplied in this step
    pub supply_price: f64,
}

impl DispatchStep {
    /// Net battery output, positive when discharging.
    pub fn battery_net_output_kw(&self) -> f64 {
        self.battery_discharge_kw - self.battery_charge_kw
    }
}

/// Immutable snapshot of one solved horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPlan {
    pub id: Uuid,
    pub created_at: DateTime<FixedOffset>,
    pub time_base: TimeBase,
    pub steps: Vec<DispatchStep>,
    /// Objective value reported for the solve that produced this plan
    pub objective: f64,
    pub solver: String,
}

impl DispatchPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn series(&self, f: impl Fn(&DispatchStep) -> f64) -> Vec<f64> {
        self.steps.iter().map(f).collect()
    }

    pub fn total_cost(&self) -> f64 {
        self.steps.iter().map(|s| s.cost).sum()
    }

    /// Copy of this plan with `[start, start + window.len())` replaced by the
    /// steps of `window`. Steps before `start` are kept as they are; a window
    /// running past the horizon end is truncated.
    pub fn spliced(&self, start: usize, window: &DispatchPlan) -> DispatchPlan {
        let mut merged = self.clone();
        let end = (start + window.len()).min(merged.steps.len());
        if start < end {
            merged.steps[start..end].clone_from_slice(&window.steps[..end - start]);
        }
        merged.id = Uuid::new_v4();
        merged.created_at = window.created_at;
        merged.objective = merged.total_cost();
        merged.solver = window.solver.clone();
        merged
    }
}
