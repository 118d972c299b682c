use serde::{Deserialize, Serialize};

/// Point on a temperature dependent performance curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub temperature_c: f64,
    pub value: f64,
}

impl CurvePoint {
    pub fn new(temperature_c: f64, value: f64) -> Self {
        Self {
            temperature_c,
            value,
        }
    }
}

/// Piecewise-linear interpolation over `curve`, clamped to the end points.
/// `curve` must be sorted by temperature. An empty curve evaluates to 0.
pub fn interpolate(curve: &[CurvePoint], temperature_c: f64) -> f64 {
    let (first, last) = match (curve.first(), curve.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return 0.0,
    };
    if temperature_c <= first.temperature_c {
        return first.value;
    }
    if temperature_c >= last.temperature_c {
        return last.value;
    }
    for pair in curve.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if temperature_c <= b.temperature_c {
            let span = b.temperature_c - a.temperature_c;
            if span <= 0.0 {
                return b.value;
            }
            let w = (temperature_c - a.temperature_c) / span;
            return a.value + w * (b.value - a.value);
        }
    }
    last.value
}

fn check_soc(name: &str, soc: f64) -> Result<(), String> {
    if !(0.0..=100.0).contains(&soc) {
        return Err(format!("{name} must be between 0 and 100, got {soc}"));
    }
    Ok(())
}

fn check_power(name: &str, min_kw: f64, max_kw: f64) -> Result<(), String> {
    if min_kw < 0.0 {
        return Err(format!("{name} min power cannot be negative"));
    }
    if min_kw > max_kw {
        return Err(format!("{name} min power {min_kw} kW exceeds max power {max_kw} kW"));
    }
    Ok(())
}

fn check_efficiency(name: &str, eta: f64) -> Result<(), String> {
    if !(eta > 0.0 && eta <= 1.0) {
        return Err(format!("{name} efficiency must be in (0, 1], got {eta}"));
    }
    Ok(())
}

/// Stationary battery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryParams {
    pub capacity_kwh: f64,
    pub min_power_kw: f64,
    pub max_power_kw: f64,
    /// One-way efficiency applied to both charge and discharge legs
    pub efficiency: f64,
    pub init_soc_percent: f64,
}

impl Default for BatteryParams {
    fn default() -> Self {
        Self {
            capacity_kwh: 0.0,
            min_power_kw: 0.0,
            max_power_kw: 0.0,
            efficiency: 1.0,
            init_soc_percent: 50.0,
        }
    }
}

impl BatteryParams {
    pub fn is_present(&self) -> bool {
        self.max_power_kw > 0.0 || self.capacity_kwh > 0.0
    }

    /// Upper bound applied to each of the charge and discharge legs.
    pub fn leg_limit_kw(&self) -> f64 {
        self.max_power_kw.min(self.capacity_kwh)
    }

    pub fn validate(&self) -> Result<(), String> {
        check_power("battery", self.min_power_kw, self.max_power_kw)?;
        check_efficiency("battery", self.efficiency)?;
        check_soc("battery init_soc_percent", self.init_soc_percent)?;
        if self.capacity_kwh < 0.0 {
            return Err("battery capacity_kwh cannot be negative".to_string());
        }
        if self.max_power_kw > 0.0 && self.capacity_kwh <= 0.0 {
            return Err(format!(
                "battery rated {} kW has no storage capacity",
                self.max_power_kw
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PvParams {
    pub peak_kw: f64,
}

impl PvParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.peak_kw < 0.0 {
            return Err("pv peak_kw cannot be negative".to_string());
        }
        Ok(())
    }
}

/// On/off state of a unit before the first step of a horizon, and how many
/// steps it had already spent in that state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub on: bool,
    pub steps: usize,
}

/// Heat pump described by its electric power and COP over ambient temperature
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeatPumpParams {
    pub electric_power_curve: Vec<CurvePoint>,
    pub cop_curve: Vec<CurvePoint>,
    /// Unknown history leaves the first step unconstrained
    #[serde(default)]
    pub initial_state: Option<RunState>,
}

impl HeatPumpParams {
    pub fn is_present(&self) -> bool {
        self.electric_power_curve.iter().any(|p| p.value > 0.0)
    }

    pub fn electric_kw(&self, ambient_c: f64) -> f64 {
        interpolate(&self.electric_power_curve, ambient_c).max(0.0)
    }

    pub fn cop(&self, ambient_c: f64) -> f64 {
        interpolate(&self.cop_curve, ambient_c).max(0.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        for curve in [&self.electric_power_curve, &self.cop_curve] {
            if curve
                .windows(2)
                .any(|w| w[1].temperature_c < w[0].temperature_c)
            {
                return Err("heat pump curves must be sorted by temperature".to_string());
            }
            if curve.iter().any(|p| p.value < 0.0) {
                return Err("heat pump curve values cannot be negative".to_string());
            }
        }
        if self.is_present() && self.cop_curve.is_empty() {
            return Err("heat pump with electric power needs a COP curve".to_string());
        }
        Ok(())
    }
}

/// Combined heat and power unit running at rated electric output when on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChpParams {
    pub max_electric_kw: f64,
    pub electric_efficiency: f64,
    pub thermal_efficiency: f64,
    #[serde(default)]
    pub initial_state: Option<RunState>,
}

impl Default for ChpParams {
    fn default() -> Self {
        Self {
            max_electric_kw: 0.0,
            electric_efficiency: 0.3,
            thermal_efficiency: 0.65,
            initial_state: None,
        }
    }
}

impl ChpParams {
    pub fn is_present(&self) -> bool {
        self.max_electric_kw > 0.0
    }

    pub fn gas_kw(&self) -> f64 {
        if self.is_present() {
            self.max_electric_kw / self.electric_efficiency
        } else {
            0.0
        }
    }

    pub fn heat_kw(&self) -> f64 {
        self.gas_kw() * self.thermal_efficiency
    }

    pub fn validate(&self) -> Result<(), String> {
        check_power("chp", 0.0, self.max_electric_kw)?;
        check_efficiency("chp electric", self.electric_efficiency)?;
        if !(0.0..=1.0).contains(&self.thermal_efficiency) {
            return Err("chp thermal efficiency must be in [0, 1]".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoilerParams {
    pub max_heat_kw: f64,
    pub efficiency: f64,
}

impl Default for BoilerParams {
    fn default() -> Self {
        Self {
            max_heat_kw: 0.0,
            efficiency: 1.0,
        }
    }
}

impl BoilerParams {
    pub fn validate(&self) -> Result<(), String> {
        check_power("boiler", 0.0, self.max_heat_kw)?;
        check_efficiency("boiler", self.efficiency)
    }
}

/// Hot water tank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermalStorageParams {
    pub capacity_kwh: f64,
    pub init_soc_percent: f64,
}

impl Default for ThermalStorageParams {
    fn default() -> Self {
        Self {
            capacity_kwh: 0.0,
            init_soc_percent: 50.0,
        }
    }
}

impl ThermalStorageParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity_kwh < 0.0 {
            return Err("thermal storage capacity_kwh cannot be negative".to_string());
        }
        check_soc("thermal storage init_soc_percent", self.init_soc_percent)
    }
}

/// Electric vehicle with a plug-in availability profile.
///
/// `required_soc_percent[t]` is the minimum state of charge the plan should
/// reach at step `t` (usually zero except at departure); a shortfall is
/// allowed but penalised. `max_soc_percent[t]` is a hard cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvParams {
    pub capacity_kwh: f64,
    pub min_power_kw: f64,
    pub max_power_kw: f64,
    pub efficiency: f64,
    pub init_soc_percent: f64,
    pub availability: Vec<bool>,
    pub required_soc_percent: Vec<f64>,
    pub max_soc_percent: Vec<f64>,
}

impl Default for EvParams {
    fn default() -> Self {
        Self {
            capacity_kwh: 0.0,
            min_power_kw: 0.0,
            max_power_kw: 0.0,
            efficiency: 0.98,
            init_soc_percent: 20.0,
            availability: Vec::new(),
            required_soc_percent: Vec::new(),
            max_soc_percent: Vec::new(),
        }
    }
}

impl EvParams {
    pub fn is_present(&self) -> bool {
        self.capacity_kwh > 0.0 && self.max_power_kw > 0.0
    }

    pub fn available(&self, step: usize) -> bool {
        self.availability.get(step).copied().unwrap_or(false)
    }

    pub fn required_soc(&self, step: usize) -> f64 {
        self.required_soc_percent.get(step).copied().unwrap_or(0.0)
    }

    pub fn max_soc(&self, step: usize) -> f64 {
        self.max_soc_percent.get(step).copied().unwrap_or(100.0)
    }

    /// EV profile restricted to `[start, start + len)`.
    pub fn window(&self, start: usize, len: usize) -> EvParams {
        fn slice<T: Clone>(v: &[T], start: usize, len: usize) -> Vec<T> {
            v.iter().skip(start).take(len).cloned().collect()
        }
        EvParams {
            availability: slice(&self.availability, start, len),
            required_soc_percent: slice(&self.required_soc_percent, start, len),
            max_soc_percent: slice(&self.max_soc_percent, start, len),
            ..self.clone()
        }
    }

    pub fn validate(&self, step_count: usize) -> Result<(), String> {
        check_power("ev", self.min_power_kw, self.max_power_kw)?;
        check_efficiency("ev", self.efficiency)?;
        check_soc("ev init_soc_percent", self.init_soc_percent)?;
        if self.capacity_kwh < 0.0 {
            return Err("ev capacity_kwh cannot be negative".to_string());
        }
        if !self.is_present() {
            return Ok(());
        }
        for (name, len) in [
            ("availability", self.availability.len()),
            ("required_soc_percent", self.required_soc_percent.len()),
            ("max_soc_percent", self.max_soc_percent.len()),
        ] {
            if len != step_count {
                return Err(format!("ev {name} has {len} entries, horizon has {step_count}"));
            }
        }
        for (t, (&req, &max)) in self
            .required_soc_percent
            .iter()
            .zip(&self.max_soc_percent)
            .enumerate()
        {
            check_soc("ev required_soc_percent", req)?;
            check_soc("ev max_soc_percent", max)?;
            if req > max {
                return Err(format!("ev required soc {req}% exceeds cap {max}% at step {t}"));
            }
        }
        Ok(())
    }
}

/// All devices of one household
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistry {
    pub battery: BatteryParams,
    pub pv: PvParams,
    pub heat_pump: HeatPumpParams,
    pub chp: ChpParams,
    pub boiler: BoilerParams,
    pub ev: EvParams,
    pub thermal_storage: ThermalStorageParams,
}

impl DeviceRegistry {
    pub fn validate(&self, step_count: usize) -> Result<(), String> {
        self.battery.validate()?;
        self.pv.validate()?;
        self.heat_pump.validate()?;
        self.chp.validate()?;
        self.boiler.validate()?;
        self.ev.validate(step_count)?;
        self.thermal_storage.validate()?;
        Ok(())
    }
}
