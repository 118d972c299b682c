use serde::{Deserialize, Serialize};

use super::{DeviceRegistry, DispatchStep, ForecastSeries, RunState, TimeBase};

/// Validated inputs of one planning problem: horizon, devices and forecasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Household {
    pub time_base: TimeBase,
    pub devices: DeviceRegistry,
    pub forecast: ForecastSeries,
}

impl Household {
    pub fn new(time_base: TimeBase, devices: DeviceRegistry, forecast: ForecastSeries) -> Self {
        Self {
            time_base,
            devices,
            forecast,
        }
    }

    pub fn step_count(&self) -> usize {
        self.time_base.step_count
    }

    pub fn validate(&self) -> Result<(), String> {
        self.time_base.validate()?;
        self.forecast.validate(self.time_base.step_count)?;
        self.devices.validate(self.time_base.step_count)
    }

    /// Sub-problem over `[start, start + len)`.
    ///
    /// `history` holds the planned steps before `start`. Storages start from
    /// the state its last step reached and heat pump / CHP carry their
    /// on/off state and its duration; without history the configured
    /// initial states apply.
    pub fn window(&self, start: usize, len: usize, history: &[DispatchStep]) -> Household {
        let mut devices = self.devices.clone();
        devices.ev = self.devices.ev.window(start, len);
        if let Some(seed) = history.last() {
            devices.battery.init_soc_percent = seed.battery_soc_percent.clamp(0.0, 100.0);
            devices.thermal_storage.init_soc_percent =
                seed.heat_storage_soc_percent.clamp(0.0, 100.0);
            devices.ev.init_soc_percent = seed.ev_soc_percent.clamp(0.0, 100.0);
        }
        devices.heat_pump.initial_state =
            run_state(history, self.devices.heat_pump.initial_state, |s| s.hp_on);
        devices.chp.initial_state = run_state(history, self.devices.chp.initial_state, |s| s.chp_on);

        Household {
            time_base: self.time_base.window(start, len),
            devices,
            forecast: self.forecast.window(start, len),
        }
    }
}

/// Run state after `history`, counting back while the unit kept its last
/// state and continuing into `initial` when the whole history agrees.
fn run_state(
    history: &[DispatchStep],
    initial: Option<RunState>,
    on: impl Fn(&DispatchStep) -> bool,
) -> Option<RunState> {
    let Some(last) = history.last() else {
        return initial;
    };
    let state = on(last);
    let steps = history.iter().rev().take_while(|s| on(s) == state).count();
    let carried = match initial {
        Some(init) if init.on == state && steps == history.len() => init.steps,
        _ => 0,
    };
    Some(RunState {
        on: state,
        steps: steps + carried,
    })
}
