use chrono::Local;
use uuid::Uuid;

use super::solver::SolvedModel;
use crate::domain::{DispatchPlan, DispatchStep};

const BINARY_ON: f64 = 0.5;

fn soc_percent(energy_kwh: f64, capacity_kwh: f64) -> f64 {
    if capacity_kwh > 0.0 {
        energy_kwh / capacity_kwh * 100.0
    } else {
        0.0
    }
}

/// Convert solver output into a [`DispatchPlan`].
///
/// Besides copying the decision variables this splits PV output into the
/// share covering the electric load, the share exported and the share sent
/// to the battery, and derives the grid share of battery charging.
pub fn extract(solved: &SolvedModel) -> DispatchPlan {
    let v = &solved.values;
    let caps = solved.capacities;

    let steps = solved
        .inputs
        .iter()
        .enumerate()
        .map(|(t, inp)| {
            let pv = v.pv_generation[t];
            let import = v.grid_import[t];
            let export = v.grid_export[t];
            let charge = v.battery_charge[t];

            let pv_to_demand = pv.min(inp.electric_load_kw);
            let pv_to_grid = (pv - pv_to_demand - charge).min(export).max(0.0);
            let pv_to_battery = (pv - pv_to_demand - pv_to_grid).max(0.0).min(charge);

            let hp_run = v.hp_run[t];
            let chp_run = v.chp_run[t];
            let chp_electric = chp_run * inp.chp_electric_kw;
            let chp_gas = chp_run * inp.chp_gas_kw;

            let supplied = import + pv + chp_electric;
            let supply_price = if supplied > 1e-9 {
                (import * inp.price_buy + pv * inp.price_sell + chp_gas * inp.gas_price) / supplied
            } else {
                0.0
            };

            DispatchStep {
                hp_on: hp_run > BINARY_ON,
                hp_electric_kw: hp_run * inp.hp_electric_kw,
                hp_heat_kw: hp_run * inp.hp_heat_kw,
                hp_cop: inp.hp_cop,
                chp_on: chp_run > BINARY_ON,
                chp_electric_kw: chp_electric,
                chp_heat_kw: chp_run * inp.chp_heat_kw,
                chp_gas_kw: chp_gas,
                boiler_heat_kw: v.boiler_heat[t],
                heat_storage_power_kw: v.heat_storage_power[t],
                heat_storage_energy_kwh: v.heat_storage_energy[t],
                heat_storage_soc_percent: soc_percent(
                    v.heat_storage_energy[t],
                    caps.heat_storage_kwh,
                ),
                heat_load_kw: inp.heat_load_kw,
                pv_power_kw: pv,
                pv_to_demand_kw: pv_to_demand,
                pv_to_grid_kw: pv_to_grid,
                pv_to_battery_kw: pv_to_battery,
                grid_import_kw: import,
                grid_export_kw: export,
                electric_load_kw: inp.electric_load_kw,
                battery_charge_kw: charge,
                battery_discharge_kw: v.battery_discharge[t],
                grid_to_battery_kw: import.min(charge),
                battery_energy_kwh: v.battery_energy[t],
                battery_soc_percent: soc_percent(v.battery_energy[t], caps.battery_kwh),
                ev_power_kw: v.ev_power[t],
                ev_soc_percent: soc_percent(v.ev_energy[t], caps.ev_kwh),
                cost: v.cost[t],
                supply_price,
            }
        })
        .collect();

    DispatchPlan {
        id: Uuid::new_v4(),
        created_at: Local::now().fixed_offset(),
        time_base: solved.time_base.clone(),
        steps,
        objective: solved.objective,
        solver: solved.solver.to_string(),
    }
}
