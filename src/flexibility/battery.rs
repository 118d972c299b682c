//! Battery flexibility
//!
//! Negative flexibility means discharging more (or charging less) than
//! scheduled, positive flexibility means charging more (or discharging
//! less). Both sides are bounded by the power left to the device limit, by
//! the state-of-charge headroom in that direction, by how long later steps
//! can sustain the same deviation, and by how much energy the rest of the
//! schedule can restore afterwards.

use super::scan::{energy_kwh, forward_run, greedy_price, tighten};
use super::{FlexibilityConfig, FlexibilityRecord};
use crate::domain::{DispatchPlan, Household};

const POWER_TOLERANCE_KW: f64 = 1e-9;

struct BatterySchedule {
    charge: Vec<f64>,
    discharge: Vec<f64>,
    grid_to_battery: Vec<f64>,
    soc_percent: Vec<f64>,
}

impl BatterySchedule {
    fn from_plan(plan: &DispatchPlan) -> Self {
        Self {
            charge: plan.series(|s| s.battery_charge_kw),
            discharge: plan.series(|s| s.battery_discharge_kw),
            grid_to_battery: plan.series(|s| s.grid_to_battery_kw),
            soc_percent: plan.series(|s| s.battery_soc_percent),
        }
    }
}

pub fn battery_flexibility(
    plan: &DispatchPlan,
    household: &Household,
    config: &FlexibilityConfig,
) -> Vec<FlexibilityRecord> {
    let battery = &household.devices.battery;
    let n = plan.len();
    if !battery.is_present() || battery.leg_limit_kw() <= 0.0 {
        return vec![FlexibilityRecord::default(); n];
    }

    let sched = BatterySchedule::from_plan(plan);
    let sph = household.time_base.steps_per_hour();
    let max_kw = battery.leg_limit_kw();
    let cap = battery.capacity_kwh;
    let buy = &household.forecast.electricity_price_buy;
    let sell = &household.forecast.electricity_price_sell;

    // Energy each step can restore after extra discharging (spare charging
    // power) and after extra charging (spare discharging power).
    let recharge_kwh: Vec<f64> = sched
        .charge
        .iter()
        .map(|c| (max_kw - c).max(0.0) / sph)
        .collect();
    let redischarge_kwh: Vec<f64> = sched
        .discharge
        .iter()
        .map(|d| (max_kw - d).max(0.0) / sph)
        .collect();
    // Scheduled charging that could be dropped, priced by the greedy pass
    let curtail_kwh: Vec<f64> = sched.charge.iter().map(|c| c / sph).collect();

    let neg_power = |j: usize| max_kw - sched.discharge[j] + sched.charge[j];
    let pos_power = |j: usize| max_kw - sched.charge[j] + sched.discharge[j];

    (0..n)
        .map(|i| {
            let mut record =
                FlexibilityRecord::idle(sched.charge[i] - sched.discharge[i]);
            let soc_kwh = sched.soc_percent[i] / 100.0 * cap;

            // Negative side
            let p_neg = neg_power(i);
            let floor_kwh = (config.battery_soc_floor_percent / 100.0 * cap)
                .max(config.battery_min_energy_kwh);
            let available_kwh = soc_kwh - floor_kwh;
            if p_neg > POWER_TOLERANCE_KW && p_neg >= battery.min_power_kw && available_kwh > 0.0 {
                let limit = (sph * available_kwh / p_neg).floor() as usize;
                let steps = forward_run(i, n, limit, |j| {
                    neg_power(j) >= p_neg - POWER_TOLERANCE_KW
                });
                let steps = tighten(i, steps, p_neg, sph, &recharge_kwh);
                if steps > 0 {
                    record.neg_power_kw = -p_neg;
                    record.neg_steps = steps;
                }
            }

            // Scheduled grid charging that could be dropped instead
            if record.neg_steps == 0
                && sched.grid_to_battery[i] > POWER_TOLERANCE_KW
                && sched.charge[i] >= battery.min_power_kw
            {
                let p = sched.charge[i];
                let g = sched.grid_to_battery[i];
                let steps = forward_run(i, n, usize::MAX, |j| {
                    sched.grid_to_battery[j] >= g - POWER_TOLERANCE_KW
                        && sched.charge[j] >= p - POWER_TOLERANCE_KW
                });
                if steps > 0 {
                    record.neg_power_kw = -p;
                    record.neg_steps = steps;
                }
            }

            if record.neg_steps > 0 {
                let claimed = energy_kwh(-record.neg_power_kw, record.neg_steps, sph);
                record.neg_energy_kwh = claimed;
                let end = i + record.neg_steps;
                let slots = (end..n).map(|k| (buy[k], curtail_kwh[k]));
                let price = if i + 1 == n {
                    sell[i]
                } else {
                    greedy_price(slots, claimed).unwrap_or(sell[i])
                };
                record.neg_price = price.max(0.0);
            }

            // Positive side
            let p_pos = pos_power(i);
            let headroom_kwh = (config.battery_soc_ceiling_percent / 100.0 * cap) - soc_kwh;
            if p_pos > POWER_TOLERANCE_KW && p_pos >= battery.min_power_kw && headroom_kwh > 0.0 {
                let limit = (sph * headroom_kwh / p_pos).floor() as usize;
                let steps = forward_run(i, n, limit, |j| {
                    pos_power(j) >= p_pos - POWER_TOLERANCE_KW
                });
                let steps = tighten(i, steps, p_pos, sph, &redischarge_kwh);
                if steps > 0 {
                    record.pos_power_kw = p_pos;
                    record.pos_steps = steps;
                    record.pos_energy_kwh = energy_kwh(p_pos, steps, sph);
                    record.pos_price = household.forecast.mean_sell_price_from(i).max(0.0);
                }
            }

            record.normalized()
        })
        .collect()
}
