// Batch validation runs

use std::fs;

use tempfile::tempdir;
use thermobox::config::{ScenarioConfig, load_suite};
use thermobox::error::ThermoError;
use thermobox::validation::{Case, Suite};

#[test]
fn test_default_suite_passes() {
    let config = load_suite(concat!(env!("CARGO_MANIFEST_DIR"), "/suites/default.toml")).unwrap();
    assert_eq!(config.workers, Some(4));
    let suite = Suite::from_config(&config).unwrap();
    assert_eq!(suite.cases().len(), 4);
    let report = suite.run(config.workers.unwrap_or(1));
    assert!(report.all_passed(), "{report}");
}

#[test]
fn test_step_count_mismatch_does_not_stop_the_batch() {
    let dir = tempdir().unwrap();
    let short = dir.path().join("short.csv");
    let mut text = String::from("timestamp,measured_temp,commanded_power\n");
    for i in 0..50 {
        text.push_str(&format!("{i},{},0.5\n", 20.0 + 0.1 * i as f64));
    }
    fs::write(&short, text).unwrap();

    let mut expects_hundred = ScenarioConfig::default();
    expects_hundred.simulation.expected_steps = Some(100);
    let mut closed_loop = ScenarioConfig::default();
    closed_loop.tolerance.steady_state_error = Some(0.5);

    let suite = Suite::new(vec![
        Case::replay("short-log", expects_hundred, &short),
        Case::closed_loop("after", closed_loop),
    ]);
    let report = suite.run(1);

    let first = report.outcome("short-log").unwrap();
    assert!(matches!(
        first.result,
        Err(ThermoError::StepCountMismatch { expected: 100, actual: 50 })
    ));
    assert!(!first.passed());
    assert!(report.outcome("after").unwrap().passed());
    assert_eq!(report.failed_count(), 1);
    assert!(report.to_string().contains("ERROR short-log"));
}

#[test]
fn test_suite_file_resolves_relative_paths() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("scenarios")).unwrap();
    fs::write(
        dir.path().join("scenarios/warm.toml"),
        "target = 30.0\n[simulation]\nsteps = 300\n[tolerance]\nsteady_state_error = 0.5\n",
    )
    .unwrap();
    let suite_path = dir.path().join("suite.toml");
    fs::write(&suite_path, "[[case]]\nname = \"warm\"\nscenario = \"scenarios/warm.toml\"\n").unwrap();

    let config = load_suite(&suite_path).unwrap();
    assert_eq!(config.cases[0].scenario, dir.path().join("scenarios/warm.toml"));
    let report = Suite::from_config(&config).unwrap().run(2);
    assert!(report.all_passed(), "{report}");
}

#[test]
fn test_missing_scenario_fails_suite_construction() {
    let dir = tempdir().unwrap();
    let suite_path = dir.path().join("suite.toml");
    fs::write(&suite_path, "[[case]]\nname = \"ghost\"\nscenario = \"ghost.toml\"\n").unwrap();
    let config = load_suite(&suite_path).unwrap();
    assert!(Suite::from_config(&config).is_err());
}
