//! Scenario and suite configuration (TOML).
//!
//! A scenario describes one run: the box, the controller, the setpoint
//! profile, how to simulate it and which tolerances it must meet. A suite
//! is a list of scenarios, each optionally paired with a recorded dataset.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::controller::{ControllerKind, build_controller};
use crate::controller::open_loop::DEFAULT_SAFETY_CUTOFF;
use crate::error::{Result, ThermoError};
use crate::monitor::MonitorConfig;
use crate::plant::PlantState;
use crate::profile::Profile;
use crate::simulator::ClosedLoopOptions;
use crate::validation::{DEFAULT_SETTLING_BAND, ToleranceSpec};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub plant: PlantConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default = "default_target", alias = "target_temp_profile")]
    pub target: Profile,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub tolerance: ToleranceSpec,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            plant: PlantConfig::default(),
            controller: ControllerConfig::default(),
            target: default_target(),
            simulation: SimulationConfig::default(),
            tolerance: ToleranceSpec::default(),
            output: OutputConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlantConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_temperature")]
    pub ambient: f64,
    #[serde(default = "default_thermal_mass")]
    pub thermal_mass: f64,
    #[serde(default = "default_loss_coefficient")]
    pub loss_coefficient: f64,
    #[serde(default = "default_heater_gain")]
    pub heater_gain: f64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            ambient: default_temperature(),
            thermal_mass: default_thermal_mass(),
            loss_coefficient: default_loss_coefficient(),
            heater_gain: default_heater_gain(),
        }
    }
}

impl PlantConfig {
    pub fn to_state(&self) -> Result<PlantState> {
        PlantState::new(
            self.temperature,
            self.ambient,
            self.thermal_mass,
            self.loss_coefficient,
            self.heater_gain,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    #[serde(rename = "type", alias = "controller_type", default)]
    pub kind: ControllerKind,
    #[serde(default = "default_kp", alias = "Kp")]
    pub kp: f64,
    #[serde(default = "default_ki", alias = "Ki")]
    pub ki: f64,
    #[serde(default = "default_kd", alias = "Kd")]
    pub kd: f64,
    #[serde(default)]
    pub actuator_min: f64,
    #[serde(default = "default_actuator_max")]
    pub actuator_max: f64,
    #[serde(default = "default_integral_clamp")]
    pub integral_clamp: f64,
    /// Half-width of the bang-bang band, °C.
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f64,
    /// Open-loop heater on-time per cycle, seconds.
    #[serde(default = "default_heating_time")]
    pub heating_time: f64,
    /// Open-loop heater off-time per cycle, seconds.
    #[serde(default = "default_heating_gap")]
    pub heating_gap: f64,
    #[serde(default = "default_safety_cutoff")]
    pub safety_cutoff: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kind: ControllerKind::Pid,
            kp: default_kp(),
            ki: default_ki(),
            kd: default_kd(),
            actuator_min: 0.0,
            actuator_max: default_actuator_max(),
            integral_clamp: default_integral_clamp(),
            hysteresis: default_hysteresis(),
            heating_time: default_heating_time(),
            heating_gap: default_heating_gap(),
            safety_cutoff: default_safety_cutoff(),
        }
    }
}

impl ControllerConfig {
    pub fn pid(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kind: ControllerKind::Pid,
            kp,
            ki,
            kd,
            ..Default::default()
        }
    }

    pub fn bang_bang(hysteresis: f64) -> Self {
        Self {
            kind: ControllerKind::BangBang,
            hysteresis,
            ..Default::default()
        }
    }

    pub fn open_loop(heating_time: f64, heating_gap: f64) -> Self {
        Self {
            kind: ControllerKind::OpenLoop,
            heating_time,
            heating_gap,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    #[serde(default = "default_steps")]
    pub steps: usize,
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Replays fail with a step count mismatch unless the dataset has exactly this many samples.
    #[serde(default)]
    pub expected_steps: Option<usize>,
    #[serde(default = "default_settling_band")]
    pub settling_band: f64,
    #[serde(default)]
    pub sensor_noise: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub ambient: Option<Profile>,
    #[serde(default)]
    pub content: Option<Profile>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            dt: default_dt(),
            expected_steps: None,
            settling_band: default_settling_band(),
            sensor_noise: 0.0,
            seed: 0,
            ambient: None,
            content: None,
        }
    }
}

impl SimulationConfig {
    pub fn closed_loop_options(&self) -> ClosedLoopOptions {
        ClosedLoopOptions {
            steps: self.steps,
            dt: self.dt,
            sensor_noise: self.sensor_noise,
            seed: self.seed,
            ambient: self.ambient.clone(),
            content: self.content.clone(),
        }
    }
}

/// Settings for whatever renders a run for humans. The engine never reads these.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { headless: default_headless() }
    }
}

impl ScenarioConfig {
    /// Run every construction check without starting a run.
    pub fn validate(&self) -> Result<()> {
        self.plant.to_state()?;
        build_controller(&self.controller)?;
        self.target.validate()?;
        self.simulation.closed_loop_options().validate()?;
        let band = self.simulation.settling_band;
        if !(band.is_finite() && band > 0.0 && band < 1.0) {
            return Err(ThermoError::invalid_config(format!(
                "settling_band must be a fraction in (0, 1), got {band}"
            )));
        }
        if self.simulation.expected_steps == Some(0) {
            return Err(ThermoError::invalid_config("expected_steps must be > 0"));
        }
        self.tolerance.validate()?;
        self.monitor.validate()?;
        Ok(())
    }

    /// Override one field by dotted key, e.g. `controller.kp=2.5`.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<()> {
        let number = || -> Result<f64> {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| ThermoError::invalid_config(format!("{key}: '{value}' is not a number")))
        };
        let count = || -> Result<usize> {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| ThermoError::invalid_config(format!("{key}: '{value}' is not a count")))
        };
        match key {
            "plant.temperature" => self.plant.temperature = number()?,
            "plant.ambient" => self.plant.ambient = number()?,
            "plant.thermal_mass" => self.plant.thermal_mass = number()?,
            "plant.loss_coefficient" => self.plant.loss_coefficient = number()?,
            "plant.heater_gain" => self.plant.heater_gain = number()?,
            "controller.type" => self.controller.kind = value.parse::<ControllerKind>()?,
            "controller.kp" => self.controller.kp = number()?,
            "controller.ki" => self.controller.ki = number()?,
            "controller.kd" => self.controller.kd = number()?,
            "controller.actuator_min" => self.controller.actuator_min = number()?,
            "controller.actuator_max" => self.controller.actuator_max = number()?,
            "controller.integral_clamp" => self.controller.integral_clamp = number()?,
            "controller.hysteresis" => self.controller.hysteresis = number()?,
            "controller.heating_time" => self.controller.heating_time = number()?,
            "controller.heating_gap" => self.controller.heating_gap = number()?,
            "controller.safety_cutoff" => self.controller.safety_cutoff = number()?,
            "target" => self.target = Profile::constant(number()?),
            "simulation.steps" => self.simulation.steps = count()?,
            "simulation.dt" => self.simulation.dt = number()?,
            "simulation.expected_steps" => self.simulation.expected_steps = Some(count()?),
            "simulation.settling_band" => self.simulation.settling_band = number()?,
            "simulation.sensor_noise" => self.simulation.sensor_noise = number()?,
            "simulation.seed" => self.simulation.seed = count()? as u64,
            "tolerance.steady_state_error" => self.tolerance.steady_state_error = Some(number()?),
            "tolerance.max_overshoot" => self.tolerance.max_overshoot = Some(number()?),
            "tolerance.settling_time" => self.tolerance.settling_time = Some(number()?),
            "tolerance.rise_time" => self.tolerance.rise_time = Some(number()?),
            "tolerance.command_deviation" => self.tolerance.command_deviation = Some(number()?),
            "monitor.process_noise" => self.monitor.process_noise = number()?,
            "monitor.measurement_noise" => self.monitor.measurement_noise = number()?,
            "monitor.initial_variance" => self.monitor.initial_variance = number()?,
            "monitor.anomaly_threshold" => self.monitor.anomaly_threshold = number()?,
            "output.headless" => {
                self.output.headless = value
                    .trim()
                    .parse::<bool>()
                    .map_err(|_| ThermoError::invalid_config(format!("{key}: '{value}' is not a bool")))?
            }
            _ => return Err(ThermoError::invalid_config(format!("unknown configuration key '{key}'"))),
        }
        Ok(())
    }
}

/// A suite file: `[[case]]` tables naming a scenario file and optional dataset.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default, rename = "case")]
    pub cases: Vec<CaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CaseConfig {
    pub name: String,
    pub scenario: PathBuf,
    #[serde(default)]
    pub dataset: Option<PathBuf>,
}

fn default_target() -> Profile { Profile::Constant(40.0) }
fn default_temperature() -> f64 { 20.0 }
fn default_thermal_mass() -> f64 { 100.0 }
fn default_loss_coefficient() -> f64 { 2.0 }
fn default_heater_gain() -> f64 { 50.0 }
fn default_kp() -> f64 { 2.0 }
fn default_ki() -> f64 { 0.1 }
fn default_kd() -> f64 { 0.5 }
fn default_actuator_max() -> f64 { 1.0 }
fn default_integral_clamp() -> f64 { 10.0 }
fn default_hysteresis() -> f64 { 0.5 }
fn default_heating_time() -> f64 { 10.0 }
fn default_heating_gap() -> f64 { 100.0 }
fn default_safety_cutoff() -> f64 { DEFAULT_SAFETY_CUTOFF }
fn default_steps() -> usize { 1000 }
fn default_dt() -> f64 { 1.0 }
fn default_settling_band() -> f64 { DEFAULT_SETTLING_BAND }
fn default_headless() -> bool { true }

pub fn load_config(path: impl AsRef<Path>) -> Result<ScenarioConfig> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse scenario TOML '{}': {}", path.display(), e);
                Err(ThermoError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read scenario file '{}': {}", path.display(), e);
            Err(ThermoError::Io(e))
        }
    }
}

/// Load a suite file; relative scenario and dataset paths are resolved
/// against the suite file's directory.
pub fn load_suite(path: impl AsRef<Path>) -> Result<SuiteConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).inspect_err(|e| {
        tracing::error!("Failed to read suite file '{}': {}", path.display(), e);
    })?;
    let mut suite: SuiteConfig = toml::from_str(&contents)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for case in &mut suite.cases {
        if case.scenario.is_relative() {
            case.scenario = base.join(&case.scenario);
        }
        if let Some(dataset) = case.dataset.as_mut() {
            if dataset.is_relative() {
                *dataset = base.join(&*dataset);
            }
        }
    }
    if suite.workers == Some(0) {
        return Err(ThermoError::invalid_config("suite workers must be > 0"));
    }
    Ok(suite)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = r#"
        target = 40.0

        [plant]
        temperature = 20.0
        ambient = 20.0
        thermal_mass = 100.0
        loss_coefficient = 2.0
        heater_gain = 50.0

        [controller]
        type = "pid"
        kp = 2.0
        ki = 0.1
        kd = 0.5
        integral_clamp = 10.0

        [simulation]
        steps = 1000
        dt = 1.0

        [tolerance]
        steady_state_error = 0.5
        max_overshoot = 2.0
        settling_time = 600.0
    "#;

    #[test]
    fn test_parse_reference_scenario() {
        let config: ScenarioConfig = toml::from_str(REFERENCE).unwrap();
        assert_eq!(config.controller.kind, ControllerKind::Pid);
        assert_eq!(config.controller.actuator_max, 1.0);
        assert_eq!(config.simulation.steps, 1000);
        assert_eq!(config.tolerance.settling_time, Some(600.0));
        assert_eq!(config.tolerance.rise_time, None);
        assert!(config.output.headless);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: ScenarioConfig = toml::from_str("").unwrap();
        assert_eq!(config, ScenarioConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_bangbang_and_stepwise_target() {
        let config: ScenarioConfig = toml::from_str(
            r#"
            target = [{ at = 0.0, temperature = 35.0 }, { at = 300.0, temperature = 38.0 }]
            [controller]
            type = "bangbang"
            hysteresis = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(config.controller.kind, ControllerKind::BangBang);
        assert_eq!(config.target.value_at(400.0), 38.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_field_aliases() {
        let config: ScenarioConfig = toml::from_str(
            r#"
            target_temp_profile = 30.0
            [controller]
            controller_type = "bangbang"
            Kp = 9.0
            Ki = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.target, Profile::constant(30.0));
        assert_eq!(config.controller.kind, ControllerKind::BangBang);
        assert_eq!(config.controller.kp, 9.0);
        assert_eq!(config.controller.ki, 0.5);
        assert_eq!(config.controller.kd, 0.5);
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_keys_rejected() {
        for text in [
            "[controller]\nkpp = 2.0",
            "[plant]\nthermal_mas = 50.0",
            "[simulation]\nstep = 10",
            "[tolerance]\novershoot = 1.0",
            "[output]\nheadles = false",
            "[monitor]\nthreshold = 2.0",
            "setpoint = 35.0",
        ] {
            assert!(toml::from_str::<ScenarioConfig>(text).is_err(), "accepted: {text}");
        }
    }

    #[test]
    fn test_open_loop_section() {
        let config: ScenarioConfig = toml::from_str(
            r#"
            [controller]
            type = "openloop"
            heating_time = 20.0
            heating_gap = 60.0

            [monitor]
            anomaly_threshold = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(config.controller.kind, ControllerKind::OpenLoop);
        assert_eq!(config.controller.heating_gap, 60.0);
        assert_eq!(config.controller.safety_cutoff, 58.0);
        assert_eq!(config.monitor.anomaly_threshold, 2.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_actuator_range() {
        let mut config = ScenarioConfig::default();
        config.controller.actuator_min = 0.9;
        config.controller.actuator_max = 0.1;
        assert!(matches!(config.validate(), Err(ThermoError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_validate_rejects_bad_simulation() {
        let mut config = ScenarioConfig::default();
        config.simulation.dt = 0.0;
        assert!(config.validate().is_err());

        let mut config = ScenarioConfig::default();
        config.simulation.settling_band = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = ScenarioConfig::default();
        config.apply_override("controller.kp", "3.5").unwrap();
        config.apply_override("controller.type", "bangbang").unwrap();
        config.apply_override("simulation.steps", "200").unwrap();
        config.apply_override("tolerance.rise_time", "90").unwrap();
        config.apply_override("output.headless", "false").unwrap();
        config.apply_override("controller.heating_gap", "30").unwrap();
        config.apply_override("monitor.anomaly_threshold", "0.5").unwrap();
        assert_eq!(config.controller.kp, 3.5);
        assert_eq!(config.controller.kind, ControllerKind::BangBang);
        assert_eq!(config.simulation.steps, 200);
        assert_eq!(config.tolerance.rise_time, Some(90.0));
        assert!(!config.output.headless);
        assert_eq!(config.controller.heating_gap, 30.0);
        assert_eq!(config.monitor.anomaly_threshold, 0.5);

        assert!(config.apply_override("controller.kp", "fast").is_err());
        assert!(config.apply_override("controller.gain", "1.0").is_err());
        assert!(config.apply_override("controller.type", "fuzzy").is_err());
    }

    #[test]
    fn test_load_suite_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let suite_path = dir.path().join("suite.toml");
        std::fs::write(
            &suite_path,
            r#"
            workers = 2
            [[case]]
            name = "closed-loop"
            scenario = "reference.toml"

            [[case]]
            name = "replay"
            scenario = "reference.toml"
            dataset = "data/step.csv"
            "#,
        )
        .unwrap();
        let suite = load_suite(&suite_path).unwrap();
        assert_eq!(suite.workers, Some(2));
        assert_eq!(suite.cases.len(), 2);
        assert_eq!(suite.cases[0].scenario, dir.path().join("reference.toml"));
        assert_eq!(suite.cases[1].dataset, Some(dir.path().join("data/step.csv")));
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(matches!(load_config("/nonexistent/scenario.toml"), Err(ThermoError::Io(_))));
    }
}
