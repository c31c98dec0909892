//! Model-based temperature estimation over recorded traces.
//!
//! A scalar Kalman filter runs the lumped plant model next to the sensor.
//! While the box behaves like the model, the innovation (measured minus
//! predicted temperature) stays near the sensor noise. An opened lid or a
//! failing heater shows up as an innovation beyond `anomaly_threshold`.

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{Result, ThermoError};
use crate::plant::PlantState;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Variance added to the estimate per prediction, °C².
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    /// Sensor variance, °C².
    #[serde(default = "default_measurement_noise")]
    pub measurement_noise: f64,
    #[serde(default = "default_initial_variance")]
    pub initial_variance: f64,
    /// Innovation magnitude, °C, above which a sample is flagged.
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            process_noise: default_process_noise(),
            measurement_noise: default_measurement_noise(),
            initial_variance: default_initial_variance(),
            anomaly_threshold: default_anomaly_threshold(),
        }
    }
}

fn default_process_noise() -> f64 { 0.001 }
fn default_measurement_noise() -> f64 { 0.01 }
fn default_initial_variance() -> f64 { 1.0 }
fn default_anomaly_threshold() -> f64 { 1.0 }

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("process_noise", self.process_noise),
            ("measurement_noise", self.measurement_noise),
            ("initial_variance", self.initial_variance),
            ("anomaly_threshold", self.anomaly_threshold),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !(v.is_finite() && *v >= 0.0)) {
            return Err(ThermoError::invalid_config(format!(
                "monitor {name} must be a non-negative finite number, got {value}"
            )));
        }
        if self.measurement_noise == 0.0 && self.initial_variance == 0.0 && self.process_noise == 0.0 {
            return Err(ThermoError::invalid_config("monitor needs some process, sensor or initial variance"));
        }
        Ok(())
    }
}

/// Scalar Kalman filter whose state is the box temperature.
#[derive(Debug, Clone)]
pub struct KalmanEstimator {
    model: PlantState,
    variance: f64,
    process_noise: f64,
    measurement_noise: f64,
}

impl KalmanEstimator {
    /// Start from `model.temperature` with the configured initial variance.
    pub fn new(model: PlantState, config: &MonitorConfig) -> Result<Self> {
        model.validate()?;
        config.validate()?;
        Ok(Self {
            model,
            variance: config.initial_variance,
            process_noise: config.process_noise,
            measurement_noise: config.measurement_noise,
        })
    }

    pub fn estimate(&self) -> f64 {
        self.model.temperature
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Propagate the estimate through one plant step and return the prediction.
    pub fn predict(&mut self, power: f64, dt: f64, ambient: Option<f64>, extra_mass: f64) -> Result<f64> {
        if let Some(ambient) = ambient {
            self.model = self.model.with_ambient(ambient);
        }
        self.model = self.model.step_loaded(power, dt, extra_mass)?;
        let mass = self.model.thermal_mass + extra_mass.max(0.0);
        let transition = 1.0 - dt * self.model.loss_coefficient / mass;
        self.variance = transition * transition * self.variance + self.process_noise;
        Ok(self.model.temperature)
    }

    /// Fold in a reading and return the innovation `measured - predicted`.
    pub fn update(&mut self, measured: f64) -> f64 {
        let innovation = measured - self.model.temperature;
        let gain = self.variance / (self.variance + self.measurement_noise);
        self.model.temperature += gain * innovation;
        self.variance *= 1.0 - gain;
        innovation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonitorSample {
    pub timestamp: f64,
    pub measured: f64,
    pub predicted: f64,
    pub estimate: f64,
    pub innovation: f64,
    pub variance: f64,
    pub anomaly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorReport {
    pub dataset: String,
    pub samples: Vec<MonitorSample>,
    pub anomalies: usize,
    pub innovation_rmse: f64,
}

impl MonitorReport {
    pub fn first_anomaly(&self) -> Option<f64> {
        self.samples.iter().find(|s| s.anomaly).map(|s| s.timestamp)
    }

    /// Runs of consecutive flagged samples as `(first, last)` timestamps.
    pub fn anomaly_windows(&self) -> Vec<(f64, f64)> {
        let mut windows: Vec<(f64, f64)> = Vec::new();
        let mut open = false;
        for s in &self.samples {
            match (s.anomaly, open) {
                (true, false) => windows.push((s.timestamp, s.timestamp)),
                (true, true) => {
                    if let Some(window) = windows.last_mut() {
                        window.1 = s.timestamp;
                    }
                }
                _ => {}
            }
            open = s.anomaly;
        }
        windows
    }
}

/// Track `dataset` with the plant model, driving the prediction with the
/// logged heater commands (and ambient or contents where recorded).
pub fn monitor_dataset(model: PlantState, dataset: &Dataset, config: &MonitorConfig) -> Result<MonitorReport> {
    let samples = dataset.samples();
    let Some(first) = samples.first() else {
        return Err(ThermoError::DatasetFormat {
            path: dataset.meta().source_path.clone(),
            reason: "dataset contains no samples".to_string(),
        });
    };

    let mut filter = KalmanEstimator::new(
        PlantState {
            temperature: first.measured_temp,
            ..model
        },
        config,
    )?;
    let mut trace = Vec::with_capacity(samples.len());
    trace.push(MonitorSample {
        timestamp: first.timestamp,
        measured: first.measured_temp,
        predicted: first.measured_temp,
        estimate: first.measured_temp,
        innovation: 0.0,
        variance: filter.variance(),
        anomaly: false,
    });

    let mut sum_sq = 0.0;
    for pair in samples.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let predicted = filter.predict(
            prev.commanded_power,
            next.timestamp - prev.timestamp,
            prev.ambient_temp,
            prev.content_mass.unwrap_or(0.0),
        )?;
        let innovation = filter.update(next.measured_temp);
        sum_sq += innovation * innovation;
        let anomaly = innovation.abs() > config.anomaly_threshold;
        if anomaly {
            tracing::debug!(
                "Anomaly at t={:.1}: measured {:.3}°C, predicted {:.3}°C",
                next.timestamp,
                next.measured_temp,
                predicted
            );
        }
        trace.push(MonitorSample {
            timestamp: next.timestamp,
            measured: next.measured_temp,
            predicted,
            estimate: filter.estimate(),
            innovation,
            variance: filter.variance(),
            anomaly,
        });
    }

    let compared = samples.len() - 1;
    let report = MonitorReport {
        dataset: dataset.name().to_string(),
        anomalies: trace.iter().filter(|s| s.anomaly).count(),
        innovation_rmse: if compared == 0 { 0.0 } else { (sum_sq / compared as f64).sqrt() },
        samples: trace,
    };
    tracing::info!(
        "Monitored '{}': {} anomalous sample(s), innovation rmse {:.4}°C",
        report.dataset,
        report.anomalies,
        report.innovation_rmse
    );
    Ok(report)
}
