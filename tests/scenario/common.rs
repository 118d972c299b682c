use chrono::{FixedOffset, TimeZone};
use itertools::Itertools;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use household_flex::domain::{CurvePoint, DeviceRegistry, ForecastSeries, Household, TimeBase};
use household_flex::optimizer::{
    GoodLpSolver, MilpOptimizer, ModelLimits, OptimizationModel, PlanningResult, SolvedModel,
    SolverBackend, SolverSettings,
};

/// Delegates to [`GoodLpSolver`] and counts invocations.
#[derive(Default)]
pub struct CountingSolver {
    calls: AtomicUsize,
}

impl CountingSolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SolverBackend for CountingSolver {
    fn solve(&self, model: OptimizationModel, settings: &SolverSettings) -> PlanningResult<SolvedModel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        GoodLpSolver.solve(model, settings)
    }
}

pub fn time_base(step_minutes: u32, steps: usize) -> TimeBase {
    let start = FixedOffset::east_opt(3600)
        .and_then(|tz| tz.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single())
        .expect("valid start");
    TimeBase::from_steps(start, step_minutes, steps)
}

/// PV only: output of 4 kW peak shaped by `solar`, 1 kW load.
pub fn pv_household(solar: &[f64]) -> Household {
    let n = solar.len();
    let mut devices = DeviceRegistry::default();
    devices.pv.peak_kw = 4.0;
    let mut forecast = ForecastSeries::flat(n);
    forecast.solar_power = solar.to_vec();
    forecast.electric_load = vec![1.0; n];
    Household::new(time_base(15, n), devices, forecast)
}

/// Battery of 10 kWh / 2 kW without losses, hourly steps, no load.
pub fn battery_household(n: usize) -> Household {
    let mut devices = DeviceRegistry::default();
    devices.battery.capacity_kwh = 10.0;
    devices.battery.max_power_kw = 2.0;
    devices.battery.efficiency = 1.0;
    Household::new(time_base(60, n), devices, ForecastSeries::flat(n))
}

/// Heat pump, boiler, tank, battery and PV over eight quarter hours.
pub fn multi_energy_household() -> Household {
    let n = 8;
    let mut devices = DeviceRegistry::default();
    devices.battery.capacity_kwh = 8.0;
    devices.battery.max_power_kw = 3.0;
    devices.battery.efficiency = 0.95;
    devices.pv.peak_kw = 5.0;
    devices.boiler.max_heat_kw = 6.0;
    devices.boiler.efficiency = 0.9;
    devices.thermal_storage.capacity_kwh = 10.0;
    devices.heat_pump.electric_power_curve =
        vec![CurvePoint::new(-10.0, 2.0), CurvePoint::new(20.0, 1.5)];
    devices.heat_pump.cop_curve = vec![CurvePoint::new(-10.0, 2.5), CurvePoint::new(20.0, 4.0)];

    let mut forecast = ForecastSeries::flat(n);
    forecast.heat_load = vec![2.0, 2.0, 2.5, 3.0, 3.0, 2.5, 2.0, 2.0];
    forecast.electric_load = vec![0.5, 0.5, 0.8, 1.2, 1.5, 1.0, 0.7, 0.5];
    forecast.solar_power = vec![0.0, 0.1, 0.4, 0.7, 0.8, 0.6, 0.2, 0.0];
    forecast.electricity_price_buy = vec![0.25, 0.25, 0.30, 0.35, 0.35, 0.30, 0.28, 0.25];
    forecast.ambient_temperature = vec![0.0, 1.0, 3.0, 6.0, 8.0, 7.0, 4.0, 2.0];
    Household::new(time_base(15, n), devices, forecast)
}

/// PV of 4 kW peak shaped by `solar`, 1 kW load and a lossless
/// 10 kWh / 2 kW battery.
pub fn pv_battery_household(solar: &[f64]) -> Household {
    let mut household = pv_household(solar);
    let battery = &mut household.devices.battery;
    battery.capacity_kwh = 10.0;
    battery.max_power_kw = 2.0;
    battery.efficiency = 1.0;
    household
}

/// Heat pump, CHP, boiler and tank over sixteen quarter hours with an
/// electricity price spike in steps 6..10.
pub fn heat_household() -> Household {
    let n = 16;
    let mut devices = DeviceRegistry::default();
    devices.boiler.max_heat_kw = 8.0;
    devices.boiler.efficiency = 0.9;
    devices.thermal_storage.capacity_kwh = 10.0;
    devices.heat_pump.electric_power_curve = vec![CurvePoint::new(0.0, 2.0)];
    devices.heat_pump.cop_curve = vec![CurvePoint::new(0.0, 3.0)];
    devices.chp.max_electric_kw = 1.0;

    let mut forecast = ForecastSeries::flat(n);
    forecast.heat_load = vec![2.0; n];
    forecast.electric_load = vec![0.5; n];
    forecast.gas_price = vec![0.2; n];
    forecast.electricity_price_buy[6..10].fill(1.0);
    Household::new(time_base(15, n), devices, forecast)
}

/// Every switch early enough to be bound by the minimum durations holds for
/// at least `min_on` (switch-on) or `min_off` (switch-off) steps.
pub fn assert_min_durations(name: &str, states: &[bool], min_on: usize, min_off: usize) {
    let mut start = 0;
    for (len, on) in states.iter().dedup_with_count() {
        let min = if *on { min_on } else { min_off };
        if start > 0 && start + min <= states.len() {
            assert!(
                len >= min,
                "{name}: run of {len} steps from step {start} in {states:?}"
            );
        }
        start += len;
    }
}

pub fn optimizer(solver: Arc<dyn SolverBackend>) -> MilpOptimizer {
    MilpOptimizer::new(solver, SolverSettings::default(), ModelLimits::default())
}

pub fn assert_close(a: f64, b: f64, tol: f64) {
    assert!((a - b).abs() <= tol, "{a} != {b} (tolerance {tol})");
}
