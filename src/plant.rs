// src/plant.rs - Lumped first-order thermal model of the box
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ThermoError};

/// State of the simulated box.
///
/// `thermal_mass` is the lumped heat capacity, `loss_coefficient` the
/// conductance to ambient and `heater_gain` the heat input at full power.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlantState {
    pub temperature: f64,      // °C
    pub ambient: f64,          // °C
    pub thermal_mass: f64,
    pub loss_coefficient: f64,
    pub heater_gain: f64,
}

/// Clamp a commanded power into the heater's physical range. Saturation is
/// a normal operating condition, so this never fails; NaN counts as off.
pub fn clamp_power(power: f64) -> f64 {
    if power.is_nan() { 0.0 } else { power.clamp(0.0, 1.0) }
}

/// Advance `state` by `dt` seconds with the heater at `commanded_power`.
pub fn step(state: PlantState, commanded_power: f64, dt: f64) -> Result<PlantState> {
    state.step(commanded_power, dt)
}

impl PlantState {
    pub fn new(
        temperature: f64,
        ambient: f64,
        thermal_mass: f64,
        loss_coefficient: f64,
        heater_gain: f64,
    ) -> Result<Self> {
        let state = Self {
            temperature,
            ambient,
            thermal_mass,
            loss_coefficient,
            heater_gain,
        };
        state.validate()?;
        Ok(state)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("temperature", self.temperature),
            ("ambient", self.ambient),
            ("thermal_mass", self.thermal_mass),
            ("loss_coefficient", self.loss_coefficient),
            ("heater_gain", self.heater_gain),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ThermoError::invalid_config(format!("plant {name} must be finite, got {value}")));
        }
        if self.thermal_mass <= 0.0 {
            return Err(ThermoError::invalid_config("plant thermal_mass must be > 0"));
        }
        if self.loss_coefficient < 0.0 {
            return Err(ThermoError::invalid_config("plant loss_coefficient must be >= 0"));
        }
        if self.heater_gain < 0.0 {
            return Err(ThermoError::invalid_config("plant heater_gain must be >= 0"));
        }
        Ok(())
    }

    pub fn step(&self, commanded_power: f64, dt: f64) -> Result<PlantState> {
        self.step_loaded(commanded_power, dt, 0.0)
    }

    /// Step with `extra_mass` of contents added to the lumped thermal mass.
    pub fn step_loaded(&self, commanded_power: f64, dt: f64, extra_mass: f64) -> Result<PlantState> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ThermoError::invalid_config(format!("plant time step must be > 0, got {dt}")));
        }
        let power = clamp_power(commanded_power);
        let mass = self.thermal_mass + extra_mass.max(0.0);
        let heat_in = self.heater_gain * power;
        let heat_out = self.loss_coefficient * (self.temperature - self.ambient);
        Ok(PlantState {
            temperature: self.temperature + dt * (heat_in - heat_out) / mass,
            ..*self
        })
    }

    pub fn with_ambient(self, ambient: f64) -> Self {
        Self { ambient, ..self }
    }

    /// Temperature the box settles at when held at a constant power.
    pub fn equilibrium_temperature(&self, power: f64) -> f64 {
        let heat_in = self.heater_gain * clamp_power(power);
        if self.loss_coefficient == 0.0 {
            return if heat_in > 0.0 { f64::INFINITY } else { self.ambient };
        }
        self.ambient + heat_in / self.loss_coefficient
    }

    /// Read the box temperature through a (possibly noisy) sensor.
    pub fn measure(&self, sensor: &mut SensorNoise) -> f64 {
        sensor.read(self.temperature)
    }
}

/// Uniform sensor noise drawn from an explicitly seeded generator, so two
/// runs with the same seed observe identical readings.
#[derive(Debug, Clone)]
pub struct SensorNoise {
    amplitude: f64,
    rng: StdRng,
}

impl SensorNoise {
    pub fn seeded(amplitude: f64, seed: u64) -> Self {
        Self {
            amplitude: amplitude.abs(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn silent() -> Self {
        Self::seeded(0.0, 0)
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn read(&mut self, true_temp: f64) -> f64 {
        if self.amplitude == 0.0 {
            return true_temp;
        }
        true_temp + self.amplitude * (self.rng.random::<f64>() - 0.5)
    }
}
