//! Flexibility quantification
//!
//! Post-processes a [`DispatchPlan`] into per-step offers: how much power a
//! device could add (`pos`) or withhold (`neg`) relative to its schedule,
//! for how many steps, and at what price. Nothing is re-solved here.

pub mod battery;
pub mod pv;
pub mod scan;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::domain::{DispatchPlan, Household};
use crate::optimizer::{PlanningError, PlanningResult};

/// Devices with a flexibility calculator
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum FlexDevice {
    Pv,
    Battery,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum FlexDirection {
    /// Reduced net draw / increased feed-in
    Negative,
    /// Increased net draw / reduced feed-in
    Positive,
}

/// Flexibility offer of one device at one step.
///
/// `neg_power_kw <= 0 <= pos_power_kw`. Energies are power times the
/// feasible duration in hours; prices are per kWh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlexibilityRecord {
    pub scheduled_power_kw: f64,
    pub neg_power_kw: f64,
    pub pos_power_kw: f64,
    pub neg_energy_kwh: f64,
    pub pos_energy_kwh: f64,
    pub neg_price: f64,
    pub pos_price: f64,
    pub neg_steps: usize,
    pub pos_steps: usize,
}

impl FlexibilityRecord {
    pub fn idle(scheduled_power_kw: f64) -> Self {
        Self {
            scheduled_power_kw,
            ..Default::default()
        }
    }

    pub fn power(&self, direction: FlexDirection) -> f64 {
        match direction {
            FlexDirection::Negative => self.neg_power_kw,
            FlexDirection::Positive => self.pos_power_kw,
        }
    }

    pub fn energy(&self, direction: FlexDirection) -> f64 {
        match direction {
            FlexDirection::Negative => self.neg_energy_kwh,
            FlexDirection::Positive => self.pos_energy_kwh,
        }
    }

    pub fn price(&self, direction: FlexDirection) -> f64 {
        match direction {
            FlexDirection::Negative => self.neg_price,
            FlexDirection::Positive => self.pos_price,
        }
    }

    pub fn steps(&self, direction: FlexDirection) -> usize {
        match direction {
            FlexDirection::Negative => self.neg_steps,
            FlexDirection::Positive => self.pos_steps,
        }
    }

    /// Clear any side that has no duration or no power.
    pub fn normalized(mut self) -> Self {
        if self.neg_steps == 0 || self.neg_power_kw == 0.0 {
            self.neg_power_kw = 0.0;
            self.neg_energy_kwh = 0.0;
            self.neg_price = 0.0;
            self.neg_steps = 0;
        }
        if self.pos_steps == 0 || self.pos_power_kw == 0.0 {
            self.pos_power_kw = 0.0;
            self.pos_energy_kwh = 0.0;
            self.pos_price = 0.0;
            self.pos_steps = 0;
        }
        self
    }
}

/// Thresholds of the flexibility calculators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexibilityConfig {
    /// PV flows at or below this are not offered (kW)
    pub pv_min_export_kw: f64,
    /// Energy a battery always keeps back when discharging (kWh)
    pub battery_min_energy_kwh: f64,
    pub battery_soc_floor_percent: f64,
    pub battery_soc_ceiling_percent: f64,
}

impl Default for FlexibilityConfig {
    fn default() -> Self {
        Self {
            pv_min_export_kw: 0.1,
            battery_min_energy_kwh: 0.5,
            battery_soc_floor_percent: 10.0,
            battery_soc_ceiling_percent: 90.0,
        }
    }
}

impl FlexibilityConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.pv_min_export_kw < 0.0 || self.battery_min_energy_kwh < 0.0 {
            return Err("flexibility thresholds cannot be negative".to_string());
        }
        let floor = self.battery_soc_floor_percent;
        let ceiling = self.battery_soc_ceiling_percent;
        if !(0.0..=100.0).contains(&floor) || !(0.0..=100.0).contains(&ceiling) || floor > ceiling {
            return Err(format!(
                "battery soc floor {floor}% / ceiling {ceiling}% must satisfy 0 <= floor <= ceiling <= 100"
            ));
        }
        Ok(())
    }
}

/// Flexibility of every device over one plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexibilityReport {
    pub steps_per_hour: f64,
    pub battery: Vec<FlexibilityRecord>,
    pub pv: Vec<FlexibilityRecord>,
}

impl FlexibilityReport {
    pub fn records(&self, device: FlexDevice) -> &[FlexibilityRecord] {
        match device {
            FlexDevice::Battery => &self.battery,
            FlexDevice::Pv => &self.pv,
        }
    }

    pub fn record(&self, device: FlexDevice, step: usize) -> Option<&FlexibilityRecord> {
        self.records(device).get(step)
    }
}

/// Compute the flexibility of `plan` over the horizon of `household`.
///
/// Fails with [`PlanningError::InfeasibleSpec`] when the plan does not
/// cover that horizon or the thresholds are invalid.
pub fn compute(
    plan: &DispatchPlan,
    household: &Household,
    config: &FlexibilityConfig,
) -> PlanningResult<FlexibilityReport> {
    let n = household.step_count();
    if plan.len() != n {
        return Err(PlanningError::InfeasibleSpec(format!(
            "plan has {} steps, horizon has {n}",
            plan.len()
        )));
    }
    household
        .forecast
        .validate(n)
        .and_then(|_| config.validate())
        .map_err(PlanningError::InfeasibleSpec)?;

    let report = FlexibilityReport {
        steps_per_hour: household.time_base.steps_per_hour(),
        battery: battery::battery_flexibility(plan, household, config),
        pv: pv::pv_flexibility(plan, household, config),
    };
    debug!(
        plan_id = %plan.id,
        battery_neg_steps = report.battery.iter().filter(|r| r.neg_steps > 0).count(),
        battery_pos_steps = report.battery.iter().filter(|r| r.pos_steps > 0).count(),
        pv_neg_steps = report.pv.iter().filter(|r| r.neg_steps > 0).count(),
        pv_pos_steps = report.pv.iter().filter(|r| r.pos_steps > 0).count(),
        "flexibility computed"
    );
    Ok(report)
}
