use std::sync::Arc;

use household_flex::flexibility::{self, FlexDevice, FlexDirection, FlexibilityConfig};
use household_flex::optimizer::{GoodLpSolver, ModelLimits, OptimizationStrategy, SolverSettings};
use household_flex::reopt::{ExerciseRequest, ReoptOutcome, ReoptimizationConfig, Reoptimizer};

use super::common::{
    assert_close, battery_household, optimizer, pv_battery_household, pv_household,
    CountingSolver,
};

const TOL: f64 = 1e-6;

fn reoptimizer(solver: Arc<CountingSolver>, window_steps: usize) -> Reoptimizer {
    Reoptimizer::new(
        solver,
        SolverSettings::default(),
        ModelLimits::default(),
        FlexibilityConfig::default(),
        ReoptimizationConfig {
            window_steps,
            ..Default::default()
        },
    )
}

fn solar_profile() -> Vec<f64> {
    // 4 kW peak: 3 kW (2 kW exported) for four steps, then 2 kW (1 kW exported)
    let mut solar = vec![0.0; 16];
    solar[4..8].fill(0.75);
    solar[8..12].fill(0.5);
    solar
}

#[tokio::test]
async fn test_pv_curtailment_cuts_export_by_offer() {
    let household = pv_household(&solar_profile());
    let prior = optimizer(Arc::new(GoodLpSolver))
        .optimize(&household, None)
        .await
        .unwrap();
    let report = flexibility::compute(&prior, &household, &FlexibilityConfig::default()).unwrap();
    let offer = report.pv[4];
    assert_close(offer.neg_power_kw, -2.0, TOL);

    let solver = Arc::new(CountingSolver::default());
    let outcome = reoptimizer(solver.clone(), 8)
        .exercise(
            &household,
            &prior,
            &report,
            ExerciseRequest::new(4, FlexDevice::Pv, FlexDirection::Negative),
        )
        .await
        .unwrap();
    let ReoptOutcome::Exercised(result) = outcome else {
        panic!("offer should be exercised");
    };
    assert_eq!(solver.calls(), 2);
    assert_eq!(result.inc, 4);
    assert_eq!(result.window.start, 4);
    assert_eq!(result.window.len, 8);
    assert_eq!(result.context.type_flex()[..5], [1, 1, 1, 1, 0]);

    let x = result.flex_value_kw;
    assert_close(x, 2.0, TOL);
    for t in 0..household.step_count() {
        let delta = result.flexed.steps[t].grid_export_kw - result.baseline.steps[t].grid_export_kw;
        let expected = if (4..8).contains(&t) { -x } else { 0.0 };
        assert_close(delta, expected, TOL);
    }
    // history before the exercised step is the prior plan
    assert_eq!(result.flexed.steps[..4], prior.steps[..4]);
    assert_eq!(result.baseline.steps[..4], prior.steps[..4]);

    let sph = household.time_base.steps_per_hour();
    let settled = x * result.flex_price * result.inc as f64 / sph;
    assert_close(result.flex_revenue.total_settlement(), settled, TOL);
    let lost_export: f64 = (4..8)
        .map(|t| x * household.forecast.electricity_price_sell[t] / sph)
        .sum();
    assert_close(result.net_gain, settled - lost_export, TOL);
    assert_close(
        result.net_gain,
        result.flex_revenue.total() - result.baseline_revenue.total(),
        TOL,
    );

    // the curtailed steps have nothing left to curtail
    assert_eq!(result.flexibility.pv[4].neg_steps, 0);
}

#[tokio::test]
async fn test_empty_offer_returns_prior_without_solving() {
    let household = pv_household(&solar_profile());
    let prior = optimizer(Arc::new(GoodLpSolver))
        .optimize(&household, None)
        .await
        .unwrap();
    let report = flexibility::compute(&prior, &household, &FlexibilityConfig::default()).unwrap();
    assert_eq!(report.pv[1].neg_power_kw, 0.0);

    let solver = Arc::new(CountingSolver::default());
    let outcome = reoptimizer(solver.clone(), 8)
        .exercise(
            &household,
            &prior,
            &report,
            ExerciseRequest::new(1, FlexDevice::Pv, FlexDirection::Negative),
        )
        .await
        .unwrap();

    assert_eq!(solver.calls(), 0);
    match outcome {
        ReoptOutcome::Rejected { plan, reason } => {
            assert_eq!(plan.id, prior.id);
            assert_eq!(plan.steps, prior.steps);
            assert!(reason.contains("step 1"), "{reason}");
        }
        ReoptOutcome::Exercised(_) => panic!("empty offer must be rejected"),
    }
}

#[tokio::test]
async fn test_battery_discharge_is_forced_and_chainable() {
    let n = 12;
    let household = battery_household(n);
    let prior = optimizer(Arc::new(GoodLpSolver))
        .optimize(&household, None)
        .await
        .unwrap();
    let report = flexibility::compute(&prior, &household, &FlexibilityConfig::default()).unwrap();
    assert!(report.battery[2].neg_steps > 0);

    let solver = Arc::new(CountingSolver::default());
    let reopt = reoptimizer(solver.clone(), 8);
    let outcome = reopt
        .exercise(
            &household,
            &prior,
            &report,
            ExerciseRequest::new(2, FlexDevice::Battery, FlexDirection::Negative),
        )
        .await
        .unwrap();
    let ReoptOutcome::Exercised(result) = outcome else {
        panic!("battery offer should be exercised");
    };

    // 50% of 10 kWh down to the 10% floor at 2 kW per hour
    assert_eq!(result.inc, 2);
    for t in 2..4 {
        assert_close(result.flexed.steps[t].battery_discharge_kw, 2.0, TOL);
        assert_close(result.flexed.steps[t].battery_charge_kw, 0.0, TOL);
    }
    assert_close(result.flexed.steps[3].battery_soc_percent, 10.0, TOL);
    assert_eq!(result.flexibility.battery.len(), n);

    // the merged flex plan can be exercised again
    let again = reopt
        .exercise(
            &household,
            &result.flexed,
            &result.flexibility,
            ExerciseRequest::new(3, FlexDevice::Battery, FlexDirection::Negative),
        )
        .await
        .unwrap();
    assert!(again.is_rejected());
    assert_eq!(solver.calls(), 2);
}

#[tokio::test]
async fn test_battery_forced_charge_is_settled() {
    let n = 12;
    let household = battery_household(n);
    let prior = optimizer(Arc::new(GoodLpSolver))
        .optimize(&household, None)
        .await
        .unwrap();
    let report = flexibility::compute(&prior, &household, &FlexibilityConfig::default()).unwrap();
    let offer = report.battery[2];
    assert!(offer.pos_steps > 0);
    assert_close(offer.pos_power_kw, 2.0, TOL);

    let solver = Arc::new(CountingSolver::default());
    let outcome = reoptimizer(solver.clone(), 8)
        .exercise(
            &household,
            &prior,
            &report,
            ExerciseRequest::new(2, FlexDevice::Battery, FlexDirection::Positive),
        )
        .await
        .unwrap();
    let ReoptOutcome::Exercised(result) = outcome else {
        panic!("idle battery should take extra charge");
    };
    assert_eq!(solver.calls(), 2);

    // 50% of 10 kWh up to the 90% ceiling at 2 kW per hour
    assert_eq!(result.inc, 2);
    assert_eq!(result.context.type_flex()[..3], [4, 4, 0]);
    for t in 2..4 {
        assert_close(result.flexed.steps[t].battery_charge_kw, 2.0, TOL);
        assert_close(result.flexed.steps[t].battery_discharge_kw, 0.0, TOL);
    }
    assert_close(result.flexed.steps[3].battery_soc_percent, 90.0, TOL);
    assert_eq!(result.flexed.steps[..2], prior.steps[..2]);

    // the operator pays the offer price for the extra energy taken
    let sph = household.time_base.steps_per_hour();
    assert!(result.flex_price > 0.0);
    let settled = result.flex_value_kw * result.flex_price * result.inc as f64 / sph;
    assert_close(result.flex_revenue.total_settlement(), settled, TOL);
    for (t, row) in result.flex_revenue.rows.iter().enumerate() {
        if (2..4).contains(&t) {
            assert!(row.settlement > 0.0);
        } else {
            assert_eq!(row.settlement, 0.0);
        }
    }
    assert_close(
        result.net_gain,
        result.flex_revenue.total() - result.baseline_revenue.total(),
        TOL,
    );
}

#[tokio::test]
async fn test_pv_export_increase_diverts_battery_charging() {
    let household = pv_battery_household(&solar_profile());
    let prior = optimizer(Arc::new(GoodLpSolver))
        .optimize(&household, None)
        .await
        .unwrap();
    let report = flexibility::compute(&prior, &household, &FlexibilityConfig::default()).unwrap();
    let s = report
        .pv
        .iter()
        .position(|r| r.pos_steps > 0)
        .expect("PV charges the battery at some step");
    let x = report.pv[s].pos_power_kw;
    assert_close(x, prior.steps[s].pv_to_battery_kw, TOL);

    let solver = Arc::new(CountingSolver::default());
    let outcome = reoptimizer(solver.clone(), 16)
        .exercise(
            &household,
            &prior,
            &report,
            ExerciseRequest::new(s, FlexDevice::Pv, FlexDirection::Positive),
        )
        .await
        .unwrap();
    let ReoptOutcome::Exercised(result) = outcome else {
        panic!("PV to battery offer should be exercised");
    };
    assert_eq!(solver.calls(), 2);
    assert!(result.inc >= 1);
    assert_eq!(result.context.type_flex()[0], 2);
    assert_close(result.flex_value_kw, x, TOL);

    for t in s..s + result.inc {
        assert_close(
            result.flexed.steps[t].grid_export_kw,
            prior.steps[t].grid_export_kw + x,
            TOL,
        );
    }
    assert_eq!(result.flexed.steps[..s], prior.steps[..s]);

    // PV export increases carry no price, so nothing is settled
    assert_eq!(result.flex_price, 0.0);
    assert_eq!(result.flex_revenue.total_settlement(), 0.0);
    assert_close(
        result.net_gain,
        result.flex_revenue.total() - result.baseline_revenue.total(),
        TOL,
    );
}
