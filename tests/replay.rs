// Open-loop replay of recorded traces

use thermobox::config::{ScenarioConfig, load_config};
use thermobox::controller::{ActuatorLimits, PidController};
use thermobox::dataset::{self, Dataset};
use thermobox::profile::Profile;
use thermobox::simulator::{RunMode, compare_plant, replay_open_loop, run_scenario};
use thermobox::validation::{assert_within, evaluate};

fn reference_dataset() -> Dataset {
    dataset::load(concat!(env!("CARGO_MANIFEST_DIR"), "/datasets/reference_step")).unwrap()
}

#[test]
fn test_replay_reproduces_logged_commands() {
    let config = load_config(concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/reference_replay.toml")).unwrap();
    let dataset = reference_dataset();
    let result = run_scenario(&config, Some(&dataset)).unwrap();
    assert_eq!(result.mode(), RunMode::Replay);
    assert_eq!(result.len(), 600);

    let metrics = evaluate(&result);
    let deviation = metrics.command_deviation.unwrap();
    assert!(deviation < 1e-9, "deviation {deviation}");
    assert!(assert_within(&metrics, &config.tolerance).passed());
}

#[test]
fn test_replay_is_bit_identical() {
    let dataset = reference_dataset();
    let target = Profile::constant(40.0);
    let mut pid = PidController::new(2.0, 0.1, 0.5, ActuatorLimits::default(), 10.0).unwrap();
    let first = replay_open_loop(&mut pid, &dataset, &target, None).unwrap();
    // Same controller instance: state from the first run must not leak.
    let second = replay_open_loop(&mut pid, &dataset, &target, None).unwrap();
    assert_eq!(first, second);
    for (a, b) in first.samples().iter().zip(second.samples()) {
        assert_eq!(a.commanded.to_bits(), b.commanded.to_bits());
    }
}

#[test]
fn test_different_gains_deviate_from_log() {
    let mut config = ScenarioConfig::default();
    config.controller.kp = 8.0;
    config.tolerance.command_deviation = Some(1e-6);
    let result = run_scenario(&config, Some(&reference_dataset())).unwrap();
    let metrics = evaluate(&result);
    assert!(metrics.command_deviation.unwrap() > 0.01);
    assert!(!assert_within(&metrics, &config.tolerance).passed());
}

#[test]
fn test_plant_model_matches_reference_recording() {
    let config = ScenarioConfig::default();
    let fidelity = compare_plant(config.plant.to_state().unwrap(), &reference_dataset()).unwrap();
    assert_eq!(fidelity.samples, 600);
    assert_eq!(fidelity.predicted.len(), 600);
    // Only the 0.2 °C sensor noise separates model and log.
    assert!(fidelity.rmse < 0.3, "rmse {}", fidelity.rmse);
}
