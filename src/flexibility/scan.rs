//! Scan primitives shared by the device flexibility calculators.

use itertools::Itertools;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

const ENERGY_TOLERANCE_KWH: f64 = 1e-9;

/// Count consecutive steps `start, start + 1, ..` for which `sustains`
/// holds, stopping at `len` and after at most `limit` steps.
pub fn forward_run(start: usize, len: usize, limit: usize, sustains: impl Fn(usize) -> bool) -> usize {
    let mut steps = 0;
    while start + steps < len && steps < limit && sustains(start + steps) {
        steps += 1;
    }
    steps
}

/// Shrink a window `[start, start + steps)` until the energy it claims at
/// `power_kw` fits into what the steps after the window can restore.
///
/// `restorable_kwh[k]` is the energy step `k` can give back. Each iteration
/// removes the last window step and adds its restorable energy to the
/// budget, so `steps` strictly decreases and the loop ends at zero at the
/// latest; the cost is linear in the window length.
pub fn tighten(
    start: usize,
    steps: usize,
    power_kw: f64,
    steps_per_hour: f64,
    restorable_kwh: &[f64],
) -> usize {
    let end = (start + steps).min(restorable_kwh.len());
    let mut steps = end.saturating_sub(start);
    let mut budget: f64 = restorable_kwh[end..].iter().sum();
    while steps > 0 && energy_kwh(power_kw, steps, steps_per_hour) > budget + ENERGY_TOLERANCE_KWH {
        steps -= 1;
        budget += restorable_kwh[start + steps];
    }
    steps
}

pub fn energy_kwh(power_kw: f64, steps: usize, steps_per_hour: f64) -> f64 {
    power_kw * steps as f64 / steps_per_hour
}

/// Energy-weighted price of covering `needed_kwh` from `slots`
/// (`(price, kwh)` pairs), taking the most expensive slots first.
///
/// Returns `None` when the slots hold no energy.
pub fn greedy_price(slots: impl IntoIterator<Item = (f64, f64)>, needed_kwh: f64) -> Option<f64> {
    let mut covered = 0.0;
    let mut cost = 0.0;
    for (price, kwh) in slots
        .into_iter()
        .filter(|(_, kwh)| *kwh > 0.0)
        .sorted_by_key(|(price, _)| Reverse(OrderedFloat(*price)))
    {
        let take = kwh.min(needed_kwh - covered);
        if take <= 0.0 {
            break;
        }
        covered += take;
        cost += take * price;
    }
    (covered > 0.0).then(|| cost / covered)
}
