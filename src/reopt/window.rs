use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::ExerciseRequest;
use crate::domain::{DispatchPlan, Household};
use crate::flexibility::scan::forward_run;
use crate::flexibility::{FlexDevice, FlexDirection, FlexibilityConfig, FlexibilityReport};

/// Rolling sub-horizon `[start, start + len)` in absolute steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReoptWindow {
    pub start: usize,
    pub len: usize,
}

impl ReoptWindow {
    /// Window starting at `step`, `window_steps` long but not past the horizon.
    pub fn anchored(step: usize, horizon: usize, window_steps: usize) -> Option<Self> {
        if step >= horizon || window_steps == 0 {
            return None;
        }
        Some(Self {
            start: step,
            len: window_steps.min(horizon - step),
        })
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    /// Working copy of the household over this window, seeded from the
    /// prior plan's steps before the window.
    pub fn slice(&self, household: &Household, prior: &DispatchPlan) -> Household {
        let history = prior.steps.get(..self.start).unwrap_or(&prior.steps);
        household.window(self.start, self.len, history)
    }

    /// Export the prior plan scheduled over this window.
    pub fn reference_export(&self, prior: &DispatchPlan) -> Vec<f64> {
        prior.steps[self.range()]
            .iter()
            .map(|s| s.grid_export_kw)
            .collect()
    }
}

/// Number of steps the requested offer can actually be exercised for,
/// starting at the request step and capped at the window length.
pub fn exercise_duration(
    request: &ExerciseRequest,
    window: &ReoptWindow,
    report: &FlexibilityReport,
    household: &Household,
    prior: &DispatchPlan,
    config: &FlexibilityConfig,
) -> usize {
    let s = request.time_step;
    let records = report.records(request.device);
    let Some(anchor) = records.get(s) else {
        return 0;
    };

    match request.device {
        FlexDevice::Pv => {
            let magnitude = anchor.power(request.direction).abs();
            forward_run(s, records.len(), window.len, |j| {
                records[j].power(request.direction).abs() >= magnitude
            })
        }
        FlexDevice::Battery => {
            let by_soc = battery_soc_steps(request.direction, window, household, prior, config);
            anchor
                .steps(request.direction)
                .min(by_soc)
                .min(window.len)
        }
    }
}

/// Steps the battery can run at its power limit from the window's seed
/// state before leaving the `[floor, ceiling]` band.
fn battery_soc_steps(
    direction: FlexDirection,
    window: &ReoptWindow,
    household: &Household,
    prior: &DispatchPlan,
    config: &FlexibilityConfig,
) -> usize {
    let battery = &household.devices.battery;
    let cap = battery.capacity_kwh;
    let max_kw = battery.leg_limit_kw();
    if cap <= 0.0 || max_kw <= 0.0 {
        return 0;
    }
    let sph = household.time_base.steps_per_hour();
    let soc_percent = window
        .start
        .checked_sub(1)
        .and_then(|s| prior.steps.get(s))
        .map(|s| s.battery_soc_percent)
        .unwrap_or(battery.init_soc_percent);

    let mut energy = soc_percent / 100.0 * cap;
    let floor = config.battery_soc_floor_percent / 100.0 * cap;
    let ceiling = config.battery_soc_ceiling_percent / 100.0 * cap;
    let mut steps = 0;
    while steps < window.len {
        let next = match direction {
            FlexDirection::Negative => energy - max_kw / battery.efficiency / sph,
            FlexDirection::Positive => energy + max_kw * battery.efficiency / sph,
        };
        if next < floor - 1e-9 || next > ceiling + 1e-9 {
            break;
        }
        energy = next;
        steps += 1;
    }
    steps
}
