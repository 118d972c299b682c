use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

/// Discretized planning horizon shared by every time-indexed series.
///
/// `end` is exclusive: a horizon from 00:00 to 24:00 with 15 minute steps has
/// 96 steps, indexed `0..96`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
    pub step_count: usize,
    pub step_minutes: u32,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeBase {
    /// Build a horizon from its bounds. The span must be a positive whole
    /// number of steps.
    pub fn new(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        step_minutes: u32,
    ) -> Result<Self, String> {
        if step_minutes == 0 {
            return Err("step_minutes must be positive".to_string());
        }
        let span_minutes = end.signed_duration_since(start).num_minutes();
        if span_minutes <= 0 {
            return Err(format!("horizon end {end} must be after start {start}"));
        }
        if span_minutes % i64::from(step_minutes) != 0 {
            return Err(format!(
                "horizon of {span_minutes} minutes is not a multiple of {step_minutes} minute steps"
            ));
        }

        Ok(Self {
            step_count: (span_minutes / i64::from(step_minutes)) as usize,
            step_minutes,
            start,
            end,
        })
    }

    /// Build a horizon of `step_count` steps starting at `start`.
    pub fn from_steps(start: DateTime<FixedOffset>, step_minutes: u32, step_count: usize) -> Self {
        let end = start + Duration::minutes(i64::from(step_minutes) * step_count as i64);
        Self {
            step_count,
            step_minutes,
            start,
            end,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.step_minutes == 0 {
            return Err("step_minutes must be positive".to_string());
        }
        if self.step_count == 0 {
            return Err("horizon must contain at least one step".to_string());
        }
        let expected = Self::from_steps(self.start, self.step_minutes, self.step_count);
        if expected.end != self.end {
            return Err(format!(
                "step_count {} does not match ({} - {}) / {} min",
                self.step_count, self.end, self.start, self.step_minutes
            ));
        }
        Ok(())
    }

    /// Number of steps in one hour (4.0 for 15 minute steps).
    pub fn steps_per_hour(&self) -> f64 {
        60.0 / f64::from(self.step_minutes)
    }

    /// Converts power (kW) held for one step into energy (kWh).
    pub fn step_hours(&self) -> f64 {
        f64::from(self.step_minutes) / 60.0
    }

    pub fn slot_start(&self, step: usize) -> DateTime<FixedOffset> {
        self.start + Duration::minutes(i64::from(self.step_minutes) * step as i64)
    }

    /// Step index containing `t`, if it falls inside the horizon.
    pub fn step_at(&self, t: DateTime<FixedOffset>) -> Option<usize> {
        if t < self.start || t >= self.end {
            return None;
        }
        let minutes = t.signed_duration_since(self.start).num_minutes();
        Some((minutes / i64::from(self.step_minutes)) as usize)
    }

    /// Sub-horizon `[start, start + len)` expressed in absolute time.
    pub fn window(&self, start: usize, len: usize) -> TimeBase {
        Self::from_steps(self.slot_start(start), self.step_minutes, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn midnight() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2019, 12, 18, 0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_day_of_quarter_hours() {
        let start = midnight();
        let tb = TimeBase::new(start, start + Duration::hours(24), 15).unwrap();
        assert_eq!(tb.step_count, 96);
        assert_eq!(tb.steps_per_hour(), 4.0);
        assert_eq!(tb.step_hours(), 0.25);
        assert!(tb.validate().is_ok());
    }

    #[test]
    fn test_rejects_partial_step() {
        let start = midnight();
        assert!(TimeBase::new(start, start + Duration::minutes(50), 15).is_err());
        assert!(TimeBase::new(start, start, 15).is_err());
    }

    #[test]
    fn test_window_and_lookup() {
        let tb = TimeBase::from_steps(midnight(), 15, 96);
        let w = tb.window(10, 20);
        assert_eq!(w.step_count, 20);
        assert_eq!(w.start, tb.slot_start(10));
        assert_eq!(tb.step_at(tb.slot_start(37) + Duration::minutes(5)), Some(37));
        assert_eq!(tb.step_at(tb.end), None);
    }

    #[test]
    fn test_validate_catches_mismatch() {
        let mut tb = TimeBase::from_steps(midnight(), 15, 96);
        tb.step_count = 95;
        assert!(tb.validate().is_err());
    }
}
