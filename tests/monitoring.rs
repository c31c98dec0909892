// Model-based anomaly detection over recorded traces

use thermobox::config::ScenarioConfig;
use thermobox::dataset::{self, Dataset, TemperatureSample};
use thermobox::monitor::{MonitorConfig, monitor_dataset};

fn reference_dataset() -> Dataset {
    dataset::load(concat!(env!("CARGO_MANIFEST_DIR"), "/datasets/reference_step")).unwrap()
}

#[test]
fn test_reference_recording_has_no_anomalies() {
    let config = ScenarioConfig::default();
    let dataset = reference_dataset();
    let report = monitor_dataset(config.plant.to_state().unwrap(), &dataset, &config.monitor).unwrap();
    assert_eq!(report.samples.len(), dataset.len());
    assert_eq!(report.anomalies, 0);
    // The recording carries 0.2 °C of uniform sensor noise.
    assert!(report.innovation_rmse < 0.2, "rmse {}", report.innovation_rmse);
    let last = report.samples.last().unwrap();
    assert!((last.estimate - last.measured).abs() < 0.2);
}

#[test]
fn test_lid_opening_is_flagged() {
    // Readings 3 °C low for twenty seconds, as when the lid is lifted.
    let reference = reference_dataset();
    let samples: Vec<TemperatureSample> = reference
        .samples()
        .iter()
        .map(|s| TemperatureSample {
            measured_temp: if (300.0..320.0).contains(&s.timestamp) { s.measured_temp - 3.0 } else { s.measured_temp },
            ..*s
        })
        .collect();
    let opened = Dataset::from_samples(reference.meta().clone(), samples).unwrap();

    let plant = ScenarioConfig::default().plant.to_state().unwrap();
    let report = monitor_dataset(plant, &opened, &MonitorConfig::default()).unwrap();
    assert_eq!(report.first_anomaly(), Some(300.0));
    assert_eq!(report.anomaly_windows(), vec![(300.0, 303.0), (320.0, 323.0)]);
    assert_eq!(report.anomalies, 8);
}

#[test]
fn test_higher_threshold_ignores_short_dip() {
    let reference = reference_dataset();
    let samples: Vec<TemperatureSample> = reference
        .samples()
        .iter()
        .map(|s| TemperatureSample {
            measured_temp: if s.timestamp == 300.0 { s.measured_temp - 3.0 } else { s.measured_temp },
            ..*s
        })
        .collect();
    let dipped = Dataset::from_samples(reference.meta().clone(), samples).unwrap();
    let plant = ScenarioConfig::default().plant.to_state().unwrap();

    let strict = monitor_dataset(plant, &dipped, &MonitorConfig::default()).unwrap();
    assert!(strict.anomalies >= 1);
    let relaxed = MonitorConfig {
        anomaly_threshold: 5.0,
        ..Default::default()
    };
    assert_eq!(monitor_dataset(plant, &dipped, &relaxed).unwrap().anomalies, 0);
}
