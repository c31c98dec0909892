// src/controller/bang_bang.rs - On/off controller with a hysteresis band
use super::{ActuatorLimits, Controller, ControllerKind};
use crate::error::{Result, ThermoError};

/// Heater on below `target - hysteresis`, off above `target + hysteresis`,
/// unchanged inside the band.
#[derive(Debug, Clone)]
pub struct BangBangController {
    hysteresis: f64,
    limits: ActuatorLimits,
    heating: bool,
}

impl BangBangController {
    pub fn new(hysteresis: f64, limits: ActuatorLimits) -> Result<Self> {
        if !(hysteresis.is_finite() && hysteresis >= 0.0) {
            return Err(ThermoError::invalid_config(format!(
                "hysteresis must be a non-negative finite number, got {hysteresis}"
            )));
        }
        Ok(Self {
            hysteresis,
            limits,
            heating: false,
        })
    }

    pub fn is_heating(&self) -> bool {
        self.heating
    }
}

impl Controller for BangBangController {
    fn compute(&mut self, target: f64, measured: f64, _dt: f64) -> f64 {
        if measured < target - self.hysteresis {
            self.heating = true;
        } else if measured > target + self.hysteresis {
            self.heating = false;
        }
        if self.heating { self.limits.max() } else { self.limits.min() }
    }

    fn reset(&mut self) {
        self.heating = false;
    }

    fn actuator_range(&self) -> ActuatorLimits {
        self.limits
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::BangBang
    }
}
