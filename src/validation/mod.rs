//! Validation harness: performance metrics and tolerance checks.
//!
//! Metric definitions (times are measured from the first sample):
//!
//! * `steady_state_error` - mean `|target - measured|` over the final 10 % of samples.
//! * `max_overshoot` - largest excursion past the target in the direction of
//!   approach, never negative. Each setpoint segment takes its direction from
//!   its own first sample, so a step down counts undershoot below the new target.
//! * `settling_time` - first time after which `|measured - target|` stays
//!   within `settling_band * |target|`; infinite if never.
//! * `rise_time` - first time `measured` crosses 90 % of the step from the
//!   initial temperature to the initial target; infinite if never.
//! * `command_deviation` - replay only: largest `|commanded - reference|`.

pub mod suite;

pub use suite::{Case, CaseOutcome, CaseReport, SharedDatasets, Suite, SuiteReport};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ThermoError};
use crate::simulator::{RunResult, RunSample};

pub const DEFAULT_SETTLING_BAND: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub steady_state_error: f64,
    pub max_overshoot: f64,
    pub settling_time: f64,
    pub rise_time: f64,
    pub command_deviation: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluator {
    settling_band: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            settling_band: DEFAULT_SETTLING_BAND,
        }
    }
}

/// Evaluate with the default 2 % settling band.
pub fn evaluate(result: &RunResult) -> Metrics {
    Evaluator::default().evaluate(result)
}

impl Evaluator {
    pub fn new(settling_band: f64) -> Result<Self> {
        if !(settling_band.is_finite() && settling_band > 0.0 && settling_band < 1.0) {
            return Err(ThermoError::invalid_config(format!(
                "settling band must be a fraction in (0, 1), got {settling_band}"
            )));
        }
        Ok(Self { settling_band })
    }

    pub fn settling_band(&self) -> f64 {
        self.settling_band
    }

    pub fn evaluate(&self, result: &RunResult) -> Metrics {
        let samples = result.samples();
        let Some(first) = samples.first() else {
            return Metrics {
                steady_state_error: f64::INFINITY,
                max_overshoot: 0.0,
                settling_time: f64::INFINITY,
                rise_time: f64::INFINITY,
                command_deviation: None,
            };
        };
        let start = first.timestamp;

        let tail = (samples.len() / 10).max(1);
        let steady_state_error = samples[samples.len() - tail..]
            .iter()
            .map(|s| (s.target - s.measured).abs())
            .sum::<f64>()
            / tail as f64;

        let mut from_below = first.measured <= first.target;
        let mut segment_target = first.target;
        let mut max_overshoot = 0.0_f64;
        for s in samples {
            if s.target != segment_target {
                segment_target = s.target;
                from_below = s.measured <= s.target;
            }
            let excursion = if from_below { s.measured - s.target } else { s.target - s.measured };
            max_overshoot = max_overshoot.max(excursion);
        }

        let in_band = |s: &RunSample| {
            (s.measured - s.target).abs() <= self.settling_band * s.target.abs()
        };
        let settling_time = match samples.iter().rposition(|s| !in_band(s)) {
            None => 0.0,
            Some(last_out) => samples
                .get(last_out + 1)
                .map_or(f64::INFINITY, |s| s.timestamp - start),
        };

        let delta = first.target - first.measured;
        let threshold = first.measured + 0.9 * delta;
        let rise_time = if delta == 0.0 {
            0.0
        } else {
            samples
                .iter()
                .find(|s| if delta > 0.0 { s.measured >= threshold } else { s.measured <= threshold })
                .map_or(f64::INFINITY, |s| s.timestamp - start)
        };

        let command_deviation = samples
            .iter()
            .filter_map(|s| s.reference.map(|r| (s.commanded - r).abs()))
            .reduce(f64::max);

        Metrics {
            steady_state_error,
            max_overshoot,
            settling_time,
            rise_time,
            command_deviation,
        }
    }
}

/// Upper bounds per metric; unset bounds are not checked.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToleranceSpec {
    #[serde(default)]
    pub steady_state_error: Option<f64>,
    #[serde(default)]
    pub max_overshoot: Option<f64>,
    #[serde(default)]
    pub settling_time: Option<f64>,
    #[serde(default)]
    pub rise_time: Option<f64>,
    #[serde(default)]
    pub command_deviation: Option<f64>,
}

impl ToleranceSpec {
    pub fn validate(&self) -> Result<()> {
        for (metric, bound) in self.bounds() {
            if let Some(bound) = bound {
                if bound.is_nan() || bound < 0.0 {
                    return Err(ThermoError::invalid_config(format!(
                        "tolerance for {metric} must be >= 0, got {bound}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn bounds(&self) -> [(MetricKind, Option<f64>); 5] {
        [
            (MetricKind::SteadyStateError, self.steady_state_error),
            (MetricKind::MaxOvershoot, self.max_overshoot),
            (MetricKind::SettlingTime, self.settling_time),
            (MetricKind::RiseTime, self.rise_time),
            (MetricKind::CommandDeviation, self.command_deviation),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    SteadyStateError,
    MaxOvershoot,
    SettlingTime,
    RiseTime,
    CommandDeviation,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::SteadyStateError => "steady_state_error",
            MetricKind::MaxOvershoot => "max_overshoot",
            MetricKind::SettlingTime => "settling_time",
            MetricKind::RiseTime => "rise_time",
            MetricKind::CommandDeviation => "command_deviation",
        };
        f.write_str(name)
    }
}

impl Metrics {
    pub fn get(&self, metric: MetricKind) -> Option<f64> {
        match metric {
            MetricKind::SteadyStateError => Some(self.steady_state_error),
            MetricKind::MaxOvershoot => Some(self.max_overshoot),
            MetricKind::SettlingTime => Some(self.settling_time),
            MetricKind::RiseTime => Some(self.rise_time),
            MetricKind::CommandDeviation => self.command_deviation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricCheck {
    pub metric: MetricKind,
    /// `None` when the run cannot produce this metric (e.g. deviation of a closed-loop run).
    pub actual: Option<f64>,
    pub bound: f64,
    pub passed: bool,
}

/// Per-metric verdicts, so a failing case shows which property regressed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<MetricCheck>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &MetricCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn check(&self, metric: MetricKind) -> Option<&MetricCheck> {
        self.checks.iter().find(|c| c.metric == metric)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let actual = check.actual.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"));
            writeln!(
                f,
                "  [{}] {:<20} actual={:<12} bound={:.4}",
                if check.passed { "PASS" } else { "FAIL" },
                check.metric.to_string(),
                actual,
                check.bound
            )?;
        }
        Ok(())
    }
}

/// Compare `metrics` against every bound set in `tolerance`. A metric passes
/// when it is at most its bound; a metric the run did not produce fails.
pub fn assert_within(metrics: &Metrics, tolerance: &ToleranceSpec) -> ValidationReport {
    let checks = tolerance
        .bounds()
        .into_iter()
        .filter_map(|(metric, bound)| bound.map(|b| (metric, b)))
        .map(|(metric, bound)| {
            let actual = metrics.get(metric);
            MetricCheck {
                metric,
                actual,
                bound,
                passed: actual.is_some_and(|v| v <= bound),
            }
        })
        .collect();
    ValidationReport { checks }
}
