use serde::{Deserialize, Serialize};

/// Forecast inputs aligned to a [`TimeBase`](super::TimeBase), one value per step.
///
/// Prices are per kWh, loads in kW, `solar_power` is PV output per kW of
/// installed peak power and `ambient_temperature` is in degrees Celsius.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub electricity_price_buy: Vec<f64>,
    pub electricity_price_sell: Vec<f64>,
    pub gas_price: Vec<f64>,
    pub heat_load: Vec<f64>,
    pub electric_load: Vec<f64>,
    pub solar_power: Vec<f64>,
    pub ambient_temperature: Vec<f64>,
}

impl ForecastSeries {
    fn columns(&self) -> [(&'static str, &Vec<f64>); 7] {
        [
            ("electricity_price_buy", &self.electricity_price_buy),
            ("electricity_price_sell", &self.electricity_price_sell),
            ("gas_price", &self.gas_price),
            ("heat_load", &self.heat_load),
            ("electric_load", &self.electric_load),
            ("solar_power", &self.solar_power),
            ("ambient_temperature", &self.ambient_temperature),
        ]
    }

    /// Constant-valued forecast, handy as a starting point for scenarios.
    pub fn flat(step_count: usize) -> Self {
        Self {
            electricity_price_buy: vec![0.30; step_count],
            electricity_price_sell: vec![0.08; step_count],
            gas_price: vec![0.06; step_count],
            heat_load: vec![0.0; step_count],
            electric_load: vec![0.0; step_count],
            solar_power: vec![0.0; step_count],
            ambient_temperature: vec![10.0; step_count],
        }
    }

    pub fn validate(&self, step_count: usize) -> Result<(), String> {
        for (name, series) in self.columns() {
            if series.len() != step_count {
                return Err(format!(
                    "forecast {name} has {} entries, horizon has {step_count}",
                    series.len()
                ));
            }
            if let Some(t) = series.iter().position(|v| !v.is_finite()) {
                return Err(format!("forecast {name} is not finite at step {t}"));
            }
        }
        for (name, series) in [
            ("heat_load", &self.heat_load),
            ("electric_load", &self.electric_load),
            ("solar_power", &self.solar_power),
        ] {
            if let Some(t) = series.iter().position(|v| *v < 0.0) {
                return Err(format!("forecast {name} is negative at step {t}"));
            }
        }
        Ok(())
    }

    /// Copy of `[start, start + len)`.
    pub fn window(&self, start: usize, len: usize) -> ForecastSeries {
        let slice = |v: &Vec<f64>| v.iter().skip(start).take(len).copied().collect();
        ForecastSeries {
            electricity_price_buy: slice(&self.electricity_price_buy),
            electricity_price_sell: slice(&self.electricity_price_sell),
            gas_price: slice(&self.gas_price),
            heat_load: slice(&self.heat_load),
            electric_load: slice(&self.electric_load),
            solar_power: slice(&self.solar_power),
            ambient_temperature: slice(&self.ambient_temperature),
        }
    }

    /// Mean sell price over `[from, len)`; 0 for an empty range.
    pub fn mean_sell_price_from(&self, from: usize) -> f64 {
        let tail = self.electricity_price_sell.get(from..).unwrap_or(&[]);
        if tail.is_empty() {
            return 0.0;
        }
        tail.iter().sum::<f64>() / tail.len() as f64
    }
}
