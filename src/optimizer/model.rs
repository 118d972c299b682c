//! Dispatch model builder
//!
//! Translates a [`Household`] into a mixed-integer linear program over its
//! horizon. The formulation per step `t` (step length `dt` hours):
//!
//! - thermal storage: `E_th[t] = E_th[t-1] + P_th[t]·dt`
//! - battery: `E_b[t] = E_b[t-1] + (P_ch[t]·η - P_dis[t]/η)·dt`
//! - EV: `E_ev[t] = E_ev[t-1] + P_ev[t]·η·dt - drive[t]`
//! - heat balance: boiler + CHP + heat pump - load - P_th = 0
//! - electricity balance: import + CHP + PV - export - heat pump - load - (P_ch - P_dis) - P_ev = 0
//! - storages kept inside the configured band and above the terminal level
//! - battery and EV minimum power through on/off binaries when configured
//! - heat pump / CHP minimum run and down times over a fixed lookahead
//! - per-step flexibility overrides when a [`ReoptimizationContext`] is given
//!
//! The objective is the sum of per-step costs (gas, import, minus export
//! revenue) plus a dominating penalty on EV state-of-charge shortfall.

use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};
use tracing::debug;

use super::{ModelLimits, PlanningError, PlanningResult};
use crate::domain::{Household, RunState, TimeBase};
use crate::reopt::{FlexOverride, ReoptimizationContext};

/// Per-step constants the model and the extractor both need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInputs {
    pub price_buy: f64,
    pub price_sell: f64,
    pub gas_price: f64,
    pub heat_load_kw: f64,
    pub electric_load_kw: f64,
    /// PV output available before curtailment
    pub pv_available_kw: f64,
    pub hp_electric_kw: f64,
    pub hp_cop: f64,
    pub hp_heat_kw: f64,
    pub chp_electric_kw: f64,
    pub chp_heat_kw: f64,
    pub chp_gas_kw: f64,
    pub boiler_efficiency: f64,
}

/// Storage capacities (kWh) used to express contents as state of charge.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Capacities {
    pub battery_kwh: f64,
    pub heat_storage_kwh: f64,
    pub ev_kwh: f64,
}

/// Decision variables, one entry per time step.
#[derive(Debug, Clone)]
pub struct DispatchVariables {
    pub boiler_heat: Vec<Variable>,
    pub pv_generation: Vec<Variable>,
    pub grid_import: Vec<Variable>,
    pub grid_export: Vec<Variable>,
    pub battery_charge: Vec<Variable>,
    pub battery_discharge: Vec<Variable>,
    pub battery_energy: Vec<Variable>,
    pub heat_storage_power: Vec<Variable>,
    pub heat_storage_energy: Vec<Variable>,
    pub ev_power: Vec<Variable>,
    pub ev_energy: Vec<Variable>,
    pub ev_drive_draw: Vec<Variable>,
    pub ev_shortfall: Vec<Variable>,
    pub hp_run: Vec<Variable>,
    pub chp_run: Vec<Variable>,
    pub cost: Vec<Variable>,
}

/// A fully built optimization problem, ready to hand to a solver.
///
/// The value is immutable once built; solving consumes it.
pub struct OptimizationModel {
    pub(crate) problem: ProblemVariables,
    pub(crate) objective: Expression,
    pub(crate) constraints: Vec<Constraint>,
    pub variables: DispatchVariables,
    pub inputs: Vec<StepInputs>,
    pub time_base: TimeBase,
    pub capacities: Capacities,
    binary_count: usize,
}

impl std::fmt::Debug for OptimizationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizationModel")
            .field("steps", &self.time_base.step_count)
            .field("constraints", &self.constraints.len())
            .field("binaries", &self.binary_count)
            .finish()
    }
}

impl OptimizationModel {
    pub fn step_count(&self) -> usize {
        self.time_base.step_count
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn binary_count(&self) -> usize {
        self.binary_count
    }
}

/// Constraint accumulator living only for the duration of one build.
#[derive(Default)]
struct Scratch {
    constraints: Vec<Constraint>,
}

impl Scratch {
    fn push(&mut self, c: Constraint) {
        self.constraints.push(c);
    }
}

/// Builds an [`OptimizationModel`] for one horizon.
pub struct ModelBuilder<'a> {
    household: &'a Household,
    limits: &'a ModelLimits,
    context: Option<&'a ReoptimizationContext>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(household: &'a Household, limits: &'a ModelLimits) -> Self {
        Self {
            household,
            limits,
            context: None,
        }
    }

    /// Apply the flexibility overrides of `context` to the window.
    pub fn with_context(mut self, context: Option<&'a ReoptimizationContext>) -> Self {
        self.context = context;
        self
    }

    pub fn build(self) -> PlanningResult<OptimizationModel> {
        let household = self.household;
        let limits = self.limits;
        household.validate().map_err(PlanningError::InfeasibleSpec)?;
        limits.validate().map_err(PlanningError::InfeasibleSpec)?;

        let n = household.step_count();
        if let Some(ctx) = self.context {
            if ctx.overrides.len() != n {
                return Err(PlanningError::InfeasibleSpec(format!(
                    "flexibility context covers {} steps, horizon has {n}",
                    ctx.overrides.len()
                )));
            }
        }

        let devices = &household.devices;
        let dt = household.time_base.step_hours();
        let inputs = step_inputs(household);

        let battery = &devices.battery;
        let storage = &devices.thermal_storage;
        let ev = &devices.ev;
        let capacities = Capacities {
            battery_kwh: battery.capacity_kwh,
            heat_storage_kwh: storage.capacity_kwh,
            ev_kwh: if ev.is_present() { ev.capacity_kwh } else { 0.0 },
        };

        let mut problem = ProblemVariables::new();
        let mut scratch = Scratch::default();
        let mut binary_count = 0;

        let bounded = |problem: &mut ProblemVariables, lo: f64, hi: f64| {
            problem.add(variable().min(lo).max(hi))
        };

        let mut vars = DispatchVariables {
            boiler_heat: Vec::with_capacity(n),
            pv_generation: Vec::with_capacity(n),
            grid_import: Vec::with_capacity(n),
            grid_export: Vec::with_capacity(n),
            battery_charge: Vec::with_capacity(n),
            battery_discharge: Vec::with_capacity(n),
            battery_energy: Vec::with_capacity(n),
            heat_storage_power: Vec::with_capacity(n),
            heat_storage_energy: Vec::with_capacity(n),
            ev_power: Vec::with_capacity(n),
            ev_energy: Vec::with_capacity(n),
            ev_drive_draw: Vec::with_capacity(n),
            ev_shortfall: Vec::with_capacity(n),
            hp_run: Vec::with_capacity(n),
            chp_run: Vec::with_capacity(n),
            cost: Vec::with_capacity(n),
        };

        let hp_present = devices.heat_pump.is_present();
        let chp_present = devices.chp.is_present();
        let ev_present = ev.is_present();
        let leg_limit = battery.leg_limit_kw();

        for (t, inp) in inputs.iter().enumerate() {
            vars.boiler_heat
                .push(bounded(&mut problem, 0.0, devices.boiler.max_heat_kw));
            vars.pv_generation
                .push(bounded(&mut problem, 0.0, inp.pv_available_kw));
            vars.grid_import
                .push(bounded(&mut problem, 0.0, limits.grid_limit_kw));
            vars.grid_export
                .push(bounded(&mut problem, 0.0, limits.grid_limit_kw));
            vars.battery_charge.push(bounded(&mut problem, 0.0, leg_limit));
            vars.battery_discharge
                .push(bounded(&mut problem, 0.0, leg_limit));
            vars.battery_energy.push(problem.add(variable().min(0.0)));
            vars.heat_storage_power.push(bounded(
                &mut problem,
                -storage.capacity_kwh,
                storage.capacity_kwh,
            ));
            vars.heat_storage_energy.push(problem.add(variable().min(0.0)));

            let (ev_max, draw_max) = match (ev_present, ev.available(t)) {
                (true, true) => (ev.max_power_kw, 0.0),
                (true, false) => (0.0, ev.capacity_kwh),
                (false, _) => (0.0, 0.0),
            };
            vars.ev_power.push(bounded(&mut problem, 0.0, ev_max));
            vars.ev_energy.push(problem.add(variable().min(0.0)));
            vars.ev_drive_draw.push(bounded(&mut problem, 0.0, draw_max));
            vars.ev_shortfall.push(problem.add(variable().min(0.0)));

            vars.hp_run.push(if hp_present && inp.hp_heat_kw > 0.0 {
                binary_count += 1;
                problem.add(variable().binary())
            } else {
                bounded(&mut problem, 0.0, 0.0)
            });
            vars.chp_run.push(if chp_present {
                binary_count += 1;
                problem.add(variable().binary())
            } else {
                bounded(&mut problem, 0.0, 0.0)
            });
            vars.cost.push(problem.add(variable()));
        }

        // Battery minimum power: each leg is either off or within
        // [min, limit], and only one leg runs at a time
        if battery.is_present() && battery.min_power_kw > 0.0 {
            for t in 0..n {
                let charging = problem.add(variable().binary());
                let discharging = problem.add(variable().binary());
                binary_count += 2;
                let (ch, dis) = (vars.battery_charge[t], vars.battery_discharge[t]);
                scratch.push(constraint!(ch >= battery.min_power_kw * charging));
                scratch.push(constraint!(ch <= leg_limit * charging));
                scratch.push(constraint!(dis >= battery.min_power_kw * discharging));
                scratch.push(constraint!(dis <= leg_limit * discharging));
                scratch.push(constraint!(charging + discharging <= 1.0));
            }
        }

        // EV minimum charging power needs an on/off state
        if ev_present && ev.min_power_kw > 0.0 {
            for t in 0..n {
                let on = problem.add(variable().binary());
                binary_count += 1;
                let avail = if ev.available(t) { 1.0 } else { 0.0 };
                let p = vars.ev_power[t];
                scratch.push(constraint!(p >= ev.min_power_kw * on));
                scratch.push(constraint!(p <= ev.max_power_kw * avail * on));
            }
        }

        let battery_init = battery.capacity_kwh * battery.init_soc_percent / 100.0;
        let storage_init = storage.capacity_kwh * storage.init_soc_percent / 100.0;
        let ev_init = capacities.ev_kwh * ev.init_soc_percent / 100.0;

        for (t, inp) in inputs.iter().enumerate() {
            let boiler = vars.boiler_heat[t];
            let pv = vars.pv_generation[t];
            let import = vars.grid_import[t];
            let export = vars.grid_export[t];
            let ch = vars.battery_charge[t];
            let dis = vars.battery_discharge[t];
            let e_bat = vars.battery_energy[t];
            let p_th = vars.heat_storage_power[t];
            let e_th = vars.heat_storage_energy[t];
            let p_ev = vars.ev_power[t];
            let e_ev = vars.ev_energy[t];
            let drive = vars.ev_drive_draw[t];
            let shortfall = vars.ev_shortfall[t];
            let hp = vars.hp_run[t];
            let chp = vars.chp_run[t];
            let cost = vars.cost[t];

            // Storage balances
            let prev_th: Expression = if t == 0 {
                storage_init.into()
            } else {
                vars.heat_storage_energy[t - 1].into()
            };
            scratch.push(constraint!(e_th == prev_th + p_th * dt));

            let prev_bat: Expression = if t == 0 {
                battery_init.into()
            } else {
                vars.battery_energy[t - 1].into()
            };
            scratch.push(constraint!(
                e_bat == prev_bat + (ch * battery.efficiency - dis * (1.0 / battery.efficiency)) * dt
            ));

            let prev_ev: Expression = if t == 0 {
                ev_init.into()
            } else {
                vars.ev_energy[t - 1].into()
            };
            scratch.push(constraint!(
                e_ev == prev_ev + p_ev * (dt * ev.efficiency) - drive
            ));

            // Energy balances
            scratch.push(constraint!(
                boiler + chp * inp.chp_heat_kw + hp * inp.hp_heat_kw - p_th == inp.heat_load_kw
            ));
            scratch.push(constraint!(
                import + chp * inp.chp_electric_kw + pv
                    - export
                    - hp * inp.hp_electric_kw
                    - ch
                    + dis
                    - p_ev
                    == inp.electric_load_kw
            ));

            // Cost of the step
            let gas = boiler * (inp.gas_price / inp.boiler_efficiency)
                + chp * (inp.chp_gas_kw * inp.gas_price);
            scratch.push(constraint!(
                cost == (gas + import * inp.price_buy - export * inp.price_sell) * dt
                    + shortfall * limits.ev_shortfall_penalty
            ));

            // EV targets
            if ev_present {
                let required = capacities.ev_kwh * ev.required_soc(t) / 100.0;
                let cap = capacities.ev_kwh * ev.max_soc(t) / 100.0;
                scratch.push(constraint!(e_ev + shortfall >= required));
                scratch.push(constraint!(e_ev <= cap));
            } else {
                scratch.push(constraint!(shortfall == 0.0));
            }

            // Storage bands
            for (energy, capacity) in [
                (e_bat, battery.capacity_kwh),
                (e_th, storage.capacity_kwh),
            ] {
                if capacity > 0.0 {
                    scratch.push(constraint!(energy >= limits.storage_min_fraction * capacity));
                    scratch.push(constraint!(energy <= limits.storage_max_fraction * capacity));
                }
            }

            let flex = self
                .context
                .map(|c| c.overrides[t])
                .unwrap_or(FlexOverride::Free);
            apply_override(&mut scratch, flex, t, export, ch, dis, leg_limit)?;
        }

        // Terminal storage levels
        if let (Some(&e_bat), Some(&e_th)) =
            (vars.battery_energy.last(), vars.heat_storage_energy.last())
        {
            scratch.push(constraint!(
                e_bat >= limits.terminal_min_fraction * battery.capacity_kwh
            ));
            scratch.push(constraint!(
                e_th >= limits.terminal_min_fraction * storage.capacity_kwh
            ));
        }

        if hp_present {
            add_min_up_down(
                &mut scratch,
                &vars.hp_run,
                devices.heat_pump.initial_state,
                limits,
            );
        }
        if chp_present {
            add_min_up_down(&mut scratch, &vars.chp_run, devices.chp.initial_state, limits);
        }

        let objective: Expression = vars.cost.iter().map(|&c| Expression::from(c)).sum();

        debug!(
            steps = n,
            constraints = scratch.constraints.len(),
            binaries = binary_count,
            flex = self.context.is_some(),
            "built dispatch model"
        );

        Ok(OptimizationModel {
            problem,
            objective,
            constraints: scratch.constraints,
            variables: vars,
            inputs,
            time_base: household.time_base.clone(),
            capacities,
            binary_count,
        })
    }
}

/// Shorthand for `ModelBuilder::new(..).with_context(..).build()`.
pub fn build_model(
    household: &Household,
    limits: &ModelLimits,
    context: Option<&ReoptimizationContext>,
) -> PlanningResult<OptimizationModel> {
    ModelBuilder::new(household, limits)
        .with_context(context)
        .build()
}

fn step_inputs(household: &Household) -> Vec<StepInputs> {
    let devices = &household.devices;
    let f = &household.forecast;
    (0..household.step_count())
        .map(|t| {
            let ambient = f.ambient_temperature[t];
            let hp_electric_kw = devices.heat_pump.electric_kw(ambient);
            let hp_cop = devices.heat_pump.cop(ambient);
            StepInputs {
                price_buy: f.electricity_price_buy[t],
                price_sell: f.electricity_price_sell[t],
                gas_price: f.gas_price[t],
                heat_load_kw: f.heat_load[t],
                electric_load_kw: f.electric_load[t],
                pv_available_kw: devices.pv.peak_kw * f.solar_power[t],
                hp_electric_kw,
                hp_cop,
                hp_heat_kw: hp_electric_kw * hp_cop,
                chp_electric_kw: devices.chp.max_electric_kw,
                chp_heat_kw: devices.chp.heat_kw(),
                chp_gas_kw: devices.chp.gas_kw(),
                boiler_efficiency: devices.boiler.efficiency,
            }
        })
        .collect()
}

fn apply_override(
    scratch: &mut Scratch,
    flex: FlexOverride,
    t: usize,
    export: Variable,
    charge: Variable,
    discharge: Variable,
    leg_limit: f64,
) -> PlanningResult<()> {
    match flex {
        FlexOverride::Free => {}
        FlexOverride::ExportReduction {
            reference_kw,
            value_kw,
        } => {
            let target = reference_kw - value_kw;
            if target < -1e-9 {
                return Err(PlanningError::InfeasibleSpec(format!(
                    "export reduction of {value_kw} kW exceeds scheduled export {reference_kw} kW at step {t}"
                )));
            }
            scratch.push(constraint!(export == target.max(0.0)));
        }
        FlexOverride::ExportIncrease {
            reference_kw,
            value_kw,
        } => {
            scratch.push(constraint!(export == reference_kw + value_kw));
        }
        FlexOverride::ForcedDischarge => {
            scratch.push(constraint!(discharge == leg_limit));
            scratch.push(constraint!(charge == 0.0));
        }
        FlexOverride::ForcedCharge => {
            scratch.push(constraint!(charge == leg_limit));
            scratch.push(constraint!(discharge == 0.0));
        }
    }
    Ok(())
}

/// A switch-on at `t` requires the unit to stay on for `min_run_steps`
/// steps; a switch-off requires it to stay off for `min_down_steps` steps.
///
/// With a known `initial` state the first step counts as a transition from
/// it, and a run or pause still short of its minimum is held until the
/// minimum is reached.
fn add_min_up_down(
    scratch: &mut Scratch,
    run: &[Variable],
    initial: Option<RunState>,
    limits: &ModelLimits,
) {
    let n = run.len();
    let window_sum = |t: usize, w: usize| -> Expression {
        run[t..t + w].iter().map(|&v| Expression::from(v)).sum()
    };
    let prev_state = |t: usize| -> Option<Expression> {
        match t {
            0 => initial.map(|s| Expression::from(if s.on { 1.0 } else { 0.0 })),
            _ => Some(run[t - 1].into()),
        }
    };

    let up = limits.min_run_steps;
    if up > 1 && n >= up {
        for t in 0..=n - up {
            if let Some(prev) = prev_state(t) {
                let cur = Expression::from(run[t]);
                scratch.push(constraint!((cur - prev) * (up as f64) <= window_sum(t, up)));
            }
        }
    }

    let down = limits.min_down_steps;
    if down > 1 && n >= down {
        for t in 0..=n - down {
            if let Some(prev) = prev_state(t) {
                let cur = Expression::from(run[t]);
                scratch.push(constraint!(
                    (prev - cur) * (down as f64) + window_sum(t, down) <= down as f64
                ));
            }
        }
    }

    if let Some(state) = initial {
        let (minimum, level) = if state.on { (up, 1.0) } else { (down, 0.0) };
        for &v in run.iter().take(minimum.saturating_sub(state.steps)) {
            scratch.push(constraint!(v == level));
        }
    }
}
