// src/controller/open_loop.rs - Timed heater cycle with an over-temperature cutoff
use super::{ActuatorLimits, Controller, ControllerKind};
use crate::error::{Result, ThermoError};

pub const DEFAULT_SAFETY_CUTOFF: f64 = 58.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterPhase {
    Standby,
    Heating,
    CoolingDown,
    /// Latched off by the safety cutoff until `reset`.
    Tripped,
}

/// Ignores the target: heats for `heating_time` seconds, rests for
/// `heating_gap` seconds and repeats. A reading at or above
/// `safety_cutoff` switches the heater off for the rest of the run.
#[derive(Debug, Clone)]
pub struct OpenLoopController {
    heating_time: f64,
    heating_gap: f64,
    safety_cutoff: f64,
    limits: ActuatorLimits,

    phase: HeaterPhase,
    elapsed: f64,
}

impl OpenLoopController {
    pub fn new(heating_time: f64, heating_gap: f64, safety_cutoff: f64, limits: ActuatorLimits) -> Result<Self> {
        for (name, value) in [("heating_time", heating_time), ("heating_gap", heating_gap)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ThermoError::invalid_config(format!(
                    "{name} must be a positive finite number of seconds, got {value}"
                )));
            }
        }
        if !safety_cutoff.is_finite() {
            return Err(ThermoError::invalid_config(format!(
                "safety_cutoff must be finite, got {safety_cutoff}"
            )));
        }
        Ok(Self {
            heating_time,
            heating_gap,
            safety_cutoff,
            limits,
            phase: HeaterPhase::Standby,
            elapsed: 0.0,
        })
    }

    pub fn phase(&self) -> HeaterPhase {
        self.phase
    }
}

impl Controller for OpenLoopController {
    fn compute(&mut self, _target: f64, measured: f64, dt: f64) -> f64 {
        if measured.is_nan() {
            tracing::warn!("Open-loop controller received a NaN reading; heater off for this step");
            return self.limits.min();
        }
        if measured >= self.safety_cutoff {
            if self.phase != HeaterPhase::Tripped {
                tracing::warn!(
                    "Temperature {:.2}°C reached the {:.1}°C safety cutoff; heater latched off",
                    measured,
                    self.safety_cutoff
                );
                self.phase = HeaterPhase::Tripped;
            }
            return self.limits.min();
        }

        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        match self.phase {
            HeaterPhase::Tripped => self.limits.min(),
            HeaterPhase::Standby => {
                self.phase = HeaterPhase::Heating;
                self.elapsed = 0.0;
                self.limits.min()
            }
            HeaterPhase::Heating => {
                self.elapsed += dt;
                if self.elapsed >= self.heating_time {
                    tracing::debug!("Heating phase done after {:.1}s", self.elapsed);
                    self.phase = HeaterPhase::CoolingDown;
                    self.elapsed = 0.0;
                }
                self.limits.max()
            }
            HeaterPhase::CoolingDown => {
                self.elapsed += dt;
                if self.elapsed >= self.heating_gap {
                    self.phase = HeaterPhase::Heating;
                    self.elapsed = 0.0;
                }
                self.limits.min()
            }
        }
    }

    fn reset(&mut self) {
        self.phase = HeaterPhase::Standby;
        self.elapsed = 0.0;
    }

    fn actuator_range(&self) -> ActuatorLimits {
        self.limits
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::OpenLoop
    }
}
