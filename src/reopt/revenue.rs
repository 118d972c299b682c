use serde::{Deserialize, Serialize};

use crate::domain::{DispatchPlan, ForecastSeries};

/// Money flows of one step, per the step's duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueRow {
    pub export_revenue: f64,
    pub import_cost: f64,
    pub settlement: f64,
    /// `export_revenue - import_cost + settlement`
    pub net: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueTable {
    pub rows: Vec<RevenueRow>,
}

impl RevenueTable {
    /// Revenue of `plan` at the forecast prices, plus an optional per-step
    /// flexibility settlement.
    pub fn of(
        plan: &DispatchPlan,
        forecast: &ForecastSeries,
        steps_per_hour: f64,
        settlement: Option<&[f64]>,
    ) -> Self {
        let rows = plan
            .steps
            .iter()
            .enumerate()
            .map(|(t, s)| {
                let export_revenue = s.grid_export_kw * forecast.electricity_price_sell[t] / steps_per_hour;
                let import_cost = s.grid_import_kw * forecast.electricity_price_buy[t] / steps_per_hour;
                let settlement = settlement.and_then(|v| v.get(t)).copied().unwrap_or(0.0);
                RevenueRow {
                    export_revenue,
                    import_cost,
                    settlement,
                    net: export_revenue - import_cost + settlement,
                }
            })
            .collect();
        Self { rows }
    }

    pub fn total(&self) -> f64 {
        self.rows.iter().map(|r| r.net).sum()
    }

    pub fn total_settlement(&self) -> f64 {
        self.rows.iter().map(|r| r.settlement).sum()
    }
}

/// Settlement per absolute step: exercised power times the offer price,
/// over the step duration.
pub fn settlement_series(
    horizon: usize,
    window_start: usize,
    flex_value_kw: &[f64],
    price: f64,
    steps_per_hour: f64,
) -> Vec<f64> {
    let mut series = vec![0.0; horizon];
    for (t, value) in flex_value_kw.iter().enumerate() {
        if let Some(slot) = series.get_mut(window_start + t) {
            *slot = value.abs() * price / steps_per_hour;
        }
    }
    series
}
