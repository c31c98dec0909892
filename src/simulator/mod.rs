//! Simulation and replay engine.
//!
//! Two ways to exercise a controller, both yielding a [`RunResult`]:
//!
//! * closed loop: controller output drives the plant model, whose
//!   temperature is fed back on the next step;
//! * open-loop replay: the controller sees the temperatures of a recorded
//!   dataset and its would-be commands are recorded next to the logged ones.
//!
//! Everything here is synchronous and deterministic: one controller and one
//! plant per run, stepped in order, with randomness only from seeded noise.

pub mod clock;
pub mod export;

pub use clock::SimClock;

use serde::Serialize;

use crate::config::ScenarioConfig;
use crate::controller::{ActuatorLimits, Controller, build_controller};
use crate::dataset::{Dataset, DatasetMeta, TemperatureSample};
use crate::error::{Result, ThermoError};
use crate::plant::{PlantState, SensorNoise};
use crate::profile::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    ClosedLoop,
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSample {
    pub timestamp: f64,
    pub target: f64,
    pub measured: f64,
    pub commanded: f64,
    pub ambient: Option<f64>,
    /// Command logged in the replayed dataset, if any.
    pub reference: Option<f64>,
}

/// The trace of one run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    label: String,
    mode: RunMode,
    samples: Vec<RunSample>,
}

impl RunResult {
    pub fn new(label: impl Into<String>, mode: RunMode, samples: Vec<RunSample>) -> Self {
        Self {
            label: label.into(),
            mode,
            samples,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn samples(&self) -> &[RunSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn commands_within(&self, limits: ActuatorLimits) -> bool {
        self.samples.iter().all(|s| limits.contains(s.commanded))
    }

    /// Re-express the trace as a dataset so a simulated run can be replayed.
    pub fn to_dataset(&self) -> Result<Dataset> {
        let samples = self
            .samples
            .iter()
            .map(|s| TemperatureSample {
                timestamp: s.timestamp,
                measured_temp: s.measured,
                commanded_power: s.commanded,
                ambient_temp: s.ambient,
                content_mass: None,
            })
            .collect();
        Dataset::from_samples(DatasetMeta::named(self.label.clone()), samples)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedLoopOptions {
    pub steps: usize,
    pub dt: f64,
    pub sensor_noise: f64,
    pub seed: u64,
    /// Ambient drift; overrides the plant's ambient when set.
    pub ambient: Option<Profile>,
    /// Contents placed in the box, as extra lumped thermal mass.
    pub content: Option<Profile>,
}

impl ClosedLoopOptions {
    pub fn new(steps: usize, dt: f64) -> Self {
        Self {
            steps,
            dt,
            sensor_noise: 0.0,
            seed: 0,
            ambient: None,
            content: None,
        }
    }

    pub fn with_noise(mut self, amplitude: f64, seed: u64) -> Self {
        self.sensor_noise = amplitude;
        self.seed = seed;
        self
    }

    pub fn with_ambient(mut self, profile: Profile) -> Self {
        self.ambient = Some(profile);
        self
    }

    pub fn with_content(mut self, profile: Profile) -> Self {
        self.content = Some(profile);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.steps == 0 {
            return Err(ThermoError::invalid_config("simulation steps must be > 0"));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(ThermoError::invalid_config(format!("simulation dt must be > 0, got {}", self.dt)));
        }
        if !(self.sensor_noise.is_finite() && self.sensor_noise >= 0.0) {
            return Err(ThermoError::invalid_config("sensor_noise must be a non-negative finite number"));
        }
        if let Some(ambient) = &self.ambient {
            ambient.validate()?;
        }
        if let Some(content) = &self.content {
            content.validate()?;
        }
        Ok(())
    }
}

/// Where a run gets its temperatures from.
#[derive(Debug, Clone)]
pub enum RunSource<'a> {
    Plant {
        initial: PlantState,
        options: ClosedLoopOptions,
    },
    Dataset {
        dataset: &'a Dataset,
        expected_steps: Option<usize>,
    },
}

pub fn run(controller: &mut dyn Controller, source: RunSource<'_>, target: &Profile) -> Result<RunResult> {
    match source {
        RunSource::Plant { initial, options } => simulate_closed_loop(controller, initial, target, &options),
        RunSource::Dataset {
            dataset,
            expected_steps,
        } => replay_open_loop(controller, dataset, target, expected_steps),
    }
}

pub fn simulate_closed_loop(
    controller: &mut dyn Controller,
    initial: PlantState,
    target: &Profile,
    options: &ClosedLoopOptions,
) -> Result<RunResult> {
    options.validate()?;
    target.validate()?;
    initial.validate()?;

    controller.reset();
    let mut clock = SimClock::new(options.dt);
    let mut plant = initial;
    let mut sensor = SensorNoise::seeded(options.sensor_noise, options.seed);
    let mut samples = Vec::with_capacity(options.steps);

    tracing::info!(
        "Closed-loop run: {} controller, {} steps of {}s, start {:.2}°C",
        controller.kind(),
        options.steps,
        options.dt,
        initial.temperature
    );

    for _ in 0..options.steps {
        let t = clock.now();
        if let Some(ambient) = &options.ambient {
            plant = plant.with_ambient(ambient.value_at(t));
        }
        let load = options.content.as_ref().map_or(0.0, |p| p.value_at(t));
        let setpoint = target.value_at(t);
        let measured = plant.measure(&mut sensor);
        let commanded = controller.compute(setpoint, measured, options.dt);

        samples.push(RunSample {
            timestamp: t,
            target: setpoint,
            measured,
            commanded,
            ambient: Some(plant.ambient),
            reference: None,
        });
        tracing::debug!("t={:.2}s target={:.2} measured={:.3} power={:.3}", t, setpoint, measured, commanded);

        plant = plant.step_loaded(commanded, options.dt, load)?;
        clock.advance();
    }

    tracing::info!("Closed-loop run finished at {:.2}°C", plant.temperature);
    Ok(RunResult::new("closed-loop", RunMode::ClosedLoop, samples))
}

/// Feed the dataset's measured temperatures to `controller` and record what
/// it would have commanded. Nothing is fed back.
///
/// The target profile is evaluated at time since the first sample. The first
/// sample uses the dataset's nominal interval as its `dt`.
pub fn replay_open_loop(
    controller: &mut dyn Controller,
    dataset: &Dataset,
    target: &Profile,
    expected_steps: Option<usize>,
) -> Result<RunResult> {
    if let Some(expected) = expected_steps {
        if expected != dataset.len() {
            tracing::warn!(
                "Dataset '{}' has {} samples, expected {}",
                dataset.name(),
                dataset.len(),
                expected
            );
            return Err(ThermoError::StepCountMismatch {
                expected,
                actual: dataset.len(),
            });
        }
    }
    target.validate()?;

    controller.reset();
    let start = dataset.samples().first().map_or(0.0, |s| s.timestamp);
    let mut previous = None;
    let mut samples = Vec::with_capacity(dataset.len());

    tracing::info!(
        "Replaying dataset '{}' ({} samples) through {} controller",
        dataset.name(),
        dataset.len(),
        controller.kind()
    );

    for sample in dataset.samples() {
        let dt = match previous {
            Some(t) => sample.timestamp - t,
            None => dataset.nominal_dt(),
        };
        previous = Some(sample.timestamp);

        let setpoint = target.value_at(sample.timestamp - start);
        let commanded = controller.compute(setpoint, sample.measured_temp, dt);
        samples.push(RunSample {
            timestamp: sample.timestamp,
            target: setpoint,
            measured: sample.measured_temp,
            commanded,
            ambient: sample.ambient_temp,
            reference: Some(sample.commanded_power),
        });
    }

    Ok(RunResult::new(dataset.name(), RunMode::Replay, samples))
}

/// How well the plant model reproduces a recorded trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantFidelity {
    pub dataset: String,
    pub samples: usize,
    pub rmse: f64,
    pub max_abs_error: f64,
    pub predicted: Vec<f64>,
}

/// Drive the plant with the logged heater commands (and ambient/contents
/// where recorded) starting from the first logged temperature, and compare
/// the predicted temperatures with the logged ones.
pub fn compare_plant(model: PlantState, dataset: &Dataset) -> Result<PlantFidelity> {
    model.validate()?;
    let samples = dataset.samples();
    let Some(first) = samples.first() else {
        return Err(ThermoError::DatasetFormat {
            path: dataset.meta().source_path.clone(),
            reason: "dataset contains no samples".to_string(),
        });
    };

    let mut state = PlantState {
        temperature: first.measured_temp,
        ..model
    };
    let mut predicted = Vec::with_capacity(samples.len());
    predicted.push(first.measured_temp);
    let mut sum_sq = 0.0;
    let mut max_abs_error: f64 = 0.0;

    for pair in samples.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        state = state
            .with_ambient(prev.ambient_temp.unwrap_or(model.ambient))
            .step_loaded(prev.commanded_power, next.timestamp - prev.timestamp, prev.content_mass.unwrap_or(0.0))?;
        let residual = state.temperature - next.measured_temp;
        sum_sq += residual * residual;
        max_abs_error = max_abs_error.max(residual.abs());
        predicted.push(state.temperature);
    }

    let compared = samples.len() - 1;
    let rmse = if compared == 0 { 0.0 } else { (sum_sq / compared as f64).sqrt() };
    tracing::info!(
        "Plant fidelity on '{}': rmse={:.4}°C max={:.4}°C over {} intervals",
        dataset.name(),
        rmse,
        max_abs_error,
        compared
    );
    Ok(PlantFidelity {
        dataset: dataset.name().to_string(),
        samples: samples.len(),
        rmse,
        max_abs_error,
        predicted,
    })
}

/// Build the configured controller and run it: replay when a dataset is
/// given, closed-loop simulation otherwise.
pub fn run_scenario(config: &ScenarioConfig, dataset: Option<&Dataset>) -> Result<RunResult> {
    let mut controller = build_controller(&config.controller)?;
    let source = match dataset {
        Some(dataset) => RunSource::Dataset {
            dataset,
            expected_steps: config.simulation.expected_steps,
        },
        None => RunSource::Plant {
            initial: config.plant.to_state()?,
            options: config.simulation.closed_loop_options(),
        },
    };
    run(controller.as_mut(), source, &config.target)
}
