//! CLI entry point for the validation harness: suite runs, parameter sweeps and JSON reports.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use thermobox::config::{ScenarioConfig, load_config, load_suite};
use thermobox::error::{Result, ThermoError};
use thermobox::validation::{Case, Suite, SuiteReport};

/// Validation Harness CLI
#[derive(Parser, Debug)]
#[command(name = "sim-harness", about = "Batch validation of thermal controllers against tolerances.")]
pub struct Cli {
    /// Suite TOML file listing `[[case]]` entries
    #[arg(short, long)]
    suite: Option<PathBuf>,

    /// Scenario TOML used as the base of a sweep
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Parameter override applied to the sweep base (e.g. --param target=35.0)
    #[arg(long, value_parser = parse_key_val, number_of_values = 1)]
    param: Vec<(String, String)>,

    /// Parameter sweep (e.g. --sweep controller.kp=1.0:0.5:3.0)
    #[arg(long, value_parser = parse_key_val, number_of_values = 1)]
    sweep: Vec<(String, String)>,

    /// Worker threads (defaults to the suite setting, then to available cores)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Write the suite report as JSON
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Log every simulation step
    #[arg(short, long)]
    verbose: bool,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s.find('=');
    match pos {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].to_string())),
        None => Err(format!("Invalid KEY=VAL: no `=` found in '{}'.", s)),
    }
}

/// Upper bound on the values of one sweep and on the cases of a sweep product.
const MAX_SWEEP_CASES: usize = 10_000;

/// Expand `start:step:end` into the inclusive list of values.
fn sweep_values(key: &str, range: &str) -> Result<Vec<f64>> {
    let parts: Vec<f64> = range
        .split(':')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| ThermoError::invalid_config(format!("sweep {key}: '{range}' is not start:step:end")))?;
    let [start, step, end] = parts[..] else {
        return Err(ThermoError::invalid_config(format!("sweep {key}: expected start:step:end, got '{range}'")));
    };
    if !(start.is_finite() && end.is_finite() && step.is_finite() && step > 0.0) || end < start {
        return Err(ThermoError::invalid_config(format!("sweep {key}: empty range '{range}'")));
    }
    let intervals = ((end - start) / step + 1e-9).floor();
    if !(intervals.is_finite() && intervals < MAX_SWEEP_CASES as f64) {
        return Err(ThermoError::invalid_config(format!(
            "sweep {key}: '{range}' expands to more than {MAX_SWEEP_CASES} values"
        )));
    }
    let count = intervals as usize + 1;
    Ok((0..count).map(|i| start + i as f64 * step).collect())
}

fn sweep_cases(base: &ScenarioConfig, sweeps: &[(String, String)]) -> Result<Vec<Case>> {
    let mut cases = vec![Case::closed_loop("base", base.clone())];
    for (key, range) in sweeps {
        let values = sweep_values(key, range)?;
        if cases.len() * values.len() > MAX_SWEEP_CASES {
            return Err(ThermoError::invalid_config(format!(
                "sweeps expand to more than {MAX_SWEEP_CASES} cases"
            )));
        }
        let mut expanded = Vec::with_capacity(cases.len() * values.len());
        for case in &cases {
            for value in &values {
                let mut scenario = case.scenario.clone();
                scenario.apply_override(key, &value.to_string())?;
                let name = if case.name == "base" {
                    format!("{key}={value}")
                } else {
                    format!("{},{key}={value}", case.name)
                };
                expanded.push(Case::closed_loop(name, scenario));
            }
        }
        cases = expanded;
    }
    Ok(cases)
}

fn build_suite(cli: &Cli) -> Result<(Suite, Option<usize>)> {
    if let Some(path) = &cli.suite {
        tracing::info!("Loading suite from: {}", path.display());
        let config = load_suite(path)?;
        return Ok((Suite::from_config(&config)?, config.workers));
    }
    let mut base = match &cli.config {
        Some(path) => load_config(path)?,
        None => ScenarioConfig::default(),
    };
    for (key, value) in &cli.param {
        base.apply_override(key, value)?;
    }
    Ok((Suite::new(sweep_cases(&base, &cli.sweep)?), None))
}

fn execute(cli: &Cli) -> Result<SuiteReport> {
    let (suite, suite_workers) = build_suite(cli)?;
    let workers = cli
        .workers
        .or(suite_workers)
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));
    let report = suite.run(workers);
    print!("{report}");
    if let Some(path) = &cli.report {
        std::fs::write(path, report.to_json()?)?;
        tracing::info!("Wrote report to {}", path.display());
    }
    Ok(report)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    match execute(&cli) {
        Ok(report) if report.all_passed() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(2)
        }
    }
}
