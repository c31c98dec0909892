// src/validation/suite.rs - Batch runner for validation cases
//
// Cases run on scoped worker threads. Each case builds its own controller
// and plant; datasets are loaded once and shared read-only. A case that
// errors is reported as failed and the batch carries on.
use crossbeam_channel::unbounded;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Evaluator, Metrics, ValidationReport, assert_within};
use crate::config::{ScenarioConfig, SuiteConfig, load_config};
use crate::dataset::{self, Dataset};
use crate::error::{Result, ThermoError};
use crate::simulator::run_scenario;

#[derive(Debug, Clone)]
pub struct Case {
    pub name: String,
    pub scenario: ScenarioConfig,
    pub dataset: Option<PathBuf>,
}

impl Case {
    pub fn closed_loop(name: impl Into<String>, scenario: ScenarioConfig) -> Self {
        Self {
            name: name.into(),
            scenario,
            dataset: None,
        }
    }

    pub fn replay(name: impl Into<String>, scenario: ScenarioConfig, dataset: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            scenario,
            dataset: Some(dataset.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub samples: usize,
    pub metrics: Metrics,
    pub report: ValidationReport,
}

#[derive(Debug)]
pub struct CaseOutcome {
    pub name: String,
    pub result: Result<CaseReport>,
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        matches!(&self.result, Ok(report) if report.report.passed())
    }
}

#[derive(Debug, Default)]
pub struct SuiteReport {
    pub outcomes: Vec<CaseOutcome>,
}

impl SuiteReport {
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.passed_count()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(CaseOutcome::passed)
    }

    pub fn outcome(&self, name: &str) -> Option<&CaseOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// JSON summary: one entry per case with either its report or its error.
    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Entry<'a> {
            name: &'a str,
            passed: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            report: Option<&'a CaseReport>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<String>,
        }
        let entries: Vec<Entry<'_>> = self
            .outcomes
            .iter()
            .map(|o| Entry {
                name: &o.name,
                passed: o.passed(),
                report: o.result.as_ref().ok(),
                error: o.result.as_ref().err().map(|e| e.to_string()),
            })
            .collect();
        Ok(serde_json::to_string_pretty(&entries)?)
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(case) => {
                    writeln!(
                        f,
                        "{} {} ({} samples)",
                        if case.report.passed() { "PASS" } else { "FAIL" },
                        outcome.name,
                        case.samples
                    )?;
                    write!(f, "{}", case.report)?;
                }
                Err(e) => writeln!(f, "ERROR {}: {}", outcome.name, e)?,
            }
        }
        writeln!(f, "{} passed, {} failed", self.passed_count(), self.failed_count())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Suite {
    cases: Vec<Case>,
}

impl Suite {
    pub fn new(cases: Vec<Case>) -> Self {
        Self { cases }
    }

    /// Read every scenario a suite file refers to. Unreadable scenarios are
    /// configuration errors and fail the whole suite up front.
    pub fn from_config(config: &SuiteConfig) -> Result<Self> {
        let cases = config
            .cases
            .iter()
            .map(|c| {
                Ok(Case {
                    name: c.name.clone(),
                    scenario: load_config(&c.scenario)?,
                    dataset: c.dataset.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { cases })
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn run(&self, workers: usize) -> SuiteReport {
        let shared = self.preload_datasets();
        let workers = workers.clamp(1, self.cases.len().max(1));
        tracing::info!("Running {} case(s) on {} worker(s)", self.cases.len(), workers);

        let (job_tx, job_rx) = unbounded::<(usize, &Case)>();
        let (done_tx, done_rx) = unbounded::<(usize, CaseOutcome)>();
        for job in self.cases.iter().enumerate() {
            // Receiver is alive until the scope below ends.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                let shared = &shared;
                scope.spawn(move || {
                    for (index, case) in job_rx.iter() {
                        let outcome = CaseOutcome {
                            name: case.name.clone(),
                            result: run_case(case, shared),
                        };
                        let _ = done_tx.send((index, outcome));
                    }
                });
            }
        });
        drop(done_tx);

        let mut outcomes: Vec<(usize, CaseOutcome)> = done_rx.iter().collect();
        outcomes.sort_by_key(|(index, _)| *index);
        let report = SuiteReport {
            outcomes: outcomes.into_iter().map(|(_, o)| o).collect(),
        };
        tracing::info!(
            "Suite finished: {} passed, {} failed",
            report.passed_count(),
            report.failed_count()
        );
        report
    }

    /// Load each distinct dataset once. Failed loads are kept too, so every
    /// case naming that dataset reports the same error without retrying.
    pub fn preload_datasets(&self) -> SharedDatasets {
        let mut shared = SharedDatasets::new();
        for path in self.cases.iter().filter_map(|c| c.dataset.as_ref()) {
            if !shared.contains_key(path) {
                shared.insert(path.clone(), dataset::load(path).map(Arc::new));
            }
        }
        shared
    }
}

/// Datasets loaded for a suite run, keyed by the path the cases name.
pub type SharedDatasets = HashMap<PathBuf, Result<Arc<Dataset>>>;

fn lookup_dataset(path: &Path, shared: &SharedDatasets) -> Result<Arc<Dataset>> {
    match shared.get(path) {
        Some(Ok(dataset)) => Ok(Arc::clone(dataset)),
        Some(Err(e)) => Err(e.duplicate()),
        None => dataset::load(path).map(Arc::new),
    }
}

/// Run one case to a report. Errors belong to this case only.
pub fn run_case(case: &Case, shared: &SharedDatasets) -> Result<CaseReport> {
    let outcome = (|| {
        case.scenario.validate()?;
        let dataset = case
            .dataset
            .as_deref()
            .map(|p| lookup_dataset(p, shared))
            .transpose()?;
        let result = run_scenario(&case.scenario, dataset.as_deref())?;
        let metrics = Evaluator::new(case.scenario.simulation.settling_band)?.evaluate(&result);
        let report = assert_within(&metrics, &case.scenario.tolerance);
        Ok::<_, ThermoError>(CaseReport {
            samples: result.len(),
            metrics,
            report,
        })
    })();

    match &outcome {
        Ok(case_report) if case_report.report.passed() => tracing::info!("Case '{}' passed", case.name),
        Ok(case_report) => {
            let failed: Vec<String> = case_report.report.failures().map(|c| c.metric.to_string()).collect();
            tracing::warn!("Case '{}' failed: {}", case.name, failed.join(", "));
        }
        Err(e) => tracing::warn!("Case '{}' errored: {}", case.name, e),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_scenario() -> ScenarioConfig {
        let mut scenario = ScenarioConfig::default();
        scenario.simulation.steps = 400;
        scenario.tolerance.steady_state_error = Some(0.5);
        scenario
    }

    #[test]
    fn test_results_keep_case_order() {
        let cases = (0..6)
            .map(|i| {
                let mut scenario = quick_scenario();
                scenario.target = crate::profile::Profile::constant(30.0 + i as f64);
                Case::closed_loop(format!("case-{i}"), scenario)
            })
            .collect();
        let report = Suite::new(cases).run(3);
        let names: Vec<&str> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["case-0", "case-1", "case-2", "case-3", "case-4", "case-5"]);
        assert!(report.all_passed());
    }

    #[test]
    fn test_invalid_case_does_not_abort_suite() {
        let mut broken = quick_scenario();
        broken.controller.kp = -1.0;
        let suite = Suite::new(vec![
            Case::closed_loop("broken", broken),
            Case::replay("missing", quick_scenario(), "/nonexistent/trace.csv"),
            Case::closed_loop("ok", quick_scenario()),
        ]);
        let report = suite.run(2);
        assert!(matches!(
            report.outcome("broken").map(|o| &o.result),
            Some(Err(ThermoError::InvalidConfiguration(_)))
        ));
        assert!(matches!(
            report.outcome("missing").map(|o| &o.result),
            Some(Err(ThermoError::DatasetNotFound { .. }))
        ));
        assert!(report.outcome("ok").is_some_and(CaseOutcome::passed));
        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.failed_count(), 2);
    }

    #[test]
    fn test_shared_missing_dataset_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.csv");
        let suite = Suite::new(vec![
            Case::replay("first", quick_scenario(), &path),
            Case::replay("second", quick_scenario(), &path),
        ]);
        let shared = suite.preload_datasets();
        assert_eq!(shared.len(), 1);

        // A file appearing after the preload is not picked up: the stored
        // failure is what both cases report.
        std::fs::write(&path, "timestamp,measured_temp,commanded_power\n0.0,20.0,0.5\n").unwrap();
        for case in suite.cases() {
            assert!(matches!(
                run_case(case, &shared),
                Err(ThermoError::DatasetNotFound { path: missing }) if missing == path
            ));
        }
    }

    #[test]
    fn test_empty_suite() {
        let report = Suite::default().run(4);
        assert!(report.outcomes.is_empty());
        assert!(report.all_passed());
    }

    #[test]
    fn test_json_summary() {
        let report = Suite::new(vec![Case::closed_loop("ok", quick_scenario())]).run(1);
        let json = report.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["name"], "ok");
        assert_eq!(parsed[0]["passed"], true);
        assert!(parsed[0]["report"]["metrics"]["steady_state_error"].is_number());
    }
}
