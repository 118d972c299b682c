use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::flexibility::{FlexDevice, FlexDirection};

/// Operator request to exercise one flexibility offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseRequest {
    /// Absolute step from the start of the full horizon
    pub time_step: usize,
    pub device: FlexDevice,
    pub direction: FlexDirection,
}

impl ExerciseRequest {
    pub fn new(time_step: usize, device: FlexDevice, direction: FlexDirection) -> Self {
        Self {
            time_step,
            device,
            direction,
        }
    }

    pub fn flex_type(&self) -> FlexType {
        FlexType::of(self.device, self.direction)
    }
}

/// Numeric flexibility type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlexType {
    None = 0,
    PvCurtail = 1,
    PvExportIncrease = 2,
    BatteryDischarge = 3,
    BatteryCharge = 4,
}

impl FlexType {
    pub fn of(device: FlexDevice, direction: FlexDirection) -> Self {
        match (device, direction) {
            (FlexDevice::Pv, FlexDirection::Negative) => FlexType::PvCurtail,
            (FlexDevice::Pv, FlexDirection::Positive) => FlexType::PvExportIncrease,
            (FlexDevice::Battery, FlexDirection::Negative) => FlexType::BatteryDischarge,
            (FlexDevice::Battery, FlexDirection::Positive) => FlexType::BatteryCharge,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Constraint set applied to one step of a re-optimization window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlexOverride {
    #[default]
    Free,
    /// `export == reference_kw - value_kw`
    ExportReduction { reference_kw: f64, value_kw: f64 },
    /// `export == reference_kw + value_kw`
    ExportIncrease { reference_kw: f64, value_kw: f64 },
    /// Battery discharges at its power limit and does not charge
    ForcedDischarge,
    /// Battery charges at its power limit and does not discharge
    ForcedCharge,
}

impl FlexOverride {
    pub fn flex_type(&self) -> FlexType {
        match self {
            FlexOverride::Free => FlexType::None,
            FlexOverride::ExportReduction { .. } => FlexType::PvCurtail,
            FlexOverride::ExportIncrease { .. } => FlexType::PvExportIncrease,
            FlexOverride::ForcedDischarge => FlexType::BatteryDischarge,
            FlexOverride::ForcedCharge => FlexType::BatteryCharge,
        }
    }
}

/// Per-step overrides for one window solve.
///
/// `overrides` and `flex_value` are indexed relative to the window start;
/// `init_time_step` is absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReoptimizationContext {
    pub init_time_step: usize,
    pub request: Option<ExerciseRequest>,
    /// Exercised magnitude per step (kW), zero outside the exercise
    pub flex_value: Vec<f64>,
    pub overrides: Vec<FlexOverride>,
}

impl ReoptimizationContext {
    /// Context exercising `request` for `inc` steps starting at the first
    /// window step. `reference_export_kw` is the export the prior plan
    /// scheduled over the window.
    pub fn exercise(
        request: ExerciseRequest,
        window_len: usize,
        inc: usize,
        value_kw: f64,
        reference_export_kw: &[f64],
    ) -> Self {
        let inc = inc.min(window_len);
        let mut flex_value = vec![0.0; window_len];
        let mut overrides = vec![FlexOverride::Free; window_len];
        for t in 0..inc {
            let reference_kw = reference_export_kw.get(t).copied().unwrap_or(0.0);
            flex_value[t] = value_kw;
            overrides[t] = match request.flex_type() {
                FlexType::PvCurtail => FlexOverride::ExportReduction {
                    reference_kw,
                    value_kw,
                },
                FlexType::PvExportIncrease => FlexOverride::ExportIncrease {
                    reference_kw,
                    value_kw,
                },
                FlexType::BatteryDischarge => FlexOverride::ForcedDischarge,
                FlexType::BatteryCharge => FlexOverride::ForcedCharge,
                FlexType::None => FlexOverride::Free,
            };
        }
        Self {
            init_time_step: request.time_step,
            request: Some(request),
            flex_value,
            overrides,
        }
    }

    /// Context pinning every step's export to `reference_export_kw`.
    pub fn pinned_export(init_time_step: usize, reference_export_kw: &[f64]) -> Self {
        Self {
            init_time_step,
            request: None,
            flex_value: vec![0.0; reference_export_kw.len()],
            overrides: reference_export_kw
                .iter()
                .map(|&reference_kw| FlexOverride::ExportReduction {
                    reference_kw,
                    value_kw: 0.0,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    pub fn type_flex(&self) -> Vec<u8> {
        self.overrides.iter().map(|o| o.flex_type().code()).collect()
    }

    /// Window-relative steps carrying an exercised value.
    pub fn exercised_steps(&self) -> Range<usize> {
        let start = self.flex_value.iter().position(|v| *v != 0.0);
        match start {
            Some(start) => {
                let len = self.flex_value[start..]
                    .iter()
                    .take_while(|v| **v != 0.0)
                    .count();
                start..start + len
            }
            None => 0..0,
        }
    }
}
