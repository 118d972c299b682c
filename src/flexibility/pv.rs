use super::scan::{energy_kwh, forward_run};
use super::{FlexibilityConfig, FlexibilityRecord};
use crate::domain::{DispatchPlan, Household};

/// PV flexibility per step.
///
/// Negative: curtail the PV share currently exported, for as long as later
/// steps export at least as much; priced at the forgone sell price. Offered
/// whenever the plant produces more than the threshold.
/// Positive: export the PV share currently charging the battery instead,
/// for as long as later steps route at least as much into the battery;
/// unpriced. Offered when that share exceeds the threshold.
pub fn pv_flexibility(
    plan: &DispatchPlan,
    household: &Household,
    config: &FlexibilityConfig,
) -> Vec<FlexibilityRecord> {
    let n = plan.len();
    if household.devices.pv.peak_kw <= 0.0 {
        return vec![FlexibilityRecord::default(); n];
    }

    let sph = household.time_base.steps_per_hour();
    let threshold = config.pv_min_export_kw;
    let generation = plan.series(|s| s.pv_power_kw);
    let to_grid = plan.series(|s| s.pv_to_grid_kw);
    let to_battery = plan.series(|s| s.pv_to_battery_kw);
    let sell = &household.forecast.electricity_price_sell;

    (0..n)
        .map(|i| {
            let mut record = FlexibilityRecord::idle(plan.steps[i].pv_power_kw);

            let export = to_grid[i];
            if generation[i] > threshold && export > 0.0 {
                let steps = forward_run(i, n, usize::MAX, |j| to_grid[j] >= export);
                record.neg_power_kw = -export;
                record.neg_steps = steps;
                record.neg_energy_kwh = energy_kwh(export, steps, sph);
                record.neg_price = sell[i].max(0.0);
            }

            let stored = to_battery[i];
            if stored > threshold {
                let steps = forward_run(i, n, usize::MAX, |j| to_battery[j] >= stored);
                record.pos_power_kw = stored;
                record.pos_steps = steps;
                record.pos_energy_kwh = energy_kwh(stored, steps, sph);
            }

            record.normalized()
        })
        .collect()
}
