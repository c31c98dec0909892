// src/controller/mod.rs - Feedback controllers driving the heater
pub mod bang_bang;
pub mod open_loop;
pub mod pid;

pub use bang_bang::BangBangController;
pub use open_loop::{HeaterPhase, OpenLoopController};
pub use pid::PidController;

use serde::{Deserialize, Serialize};

use crate::config::ControllerConfig;
use crate::error::{Result, ThermoError};

/// Anything that turns a temperature error into a heater command.
///
/// `compute` never fails: saturation is handled by clamping to the actuator
/// range and a zero `dt` simply skips the time-dependent terms.
pub trait Controller: Send {
    fn compute(&mut self, target: f64, measured: f64, dt: f64) -> f64;
    /// Clear accumulated state. Engines call this explicitly at run start.
    fn reset(&mut self);
    fn actuator_range(&self) -> ActuatorLimits;
    fn kind(&self) -> ControllerKind;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    #[default]
    Pid,
    #[serde(alias = "bang_bang")]
    BangBang,
    #[serde(alias = "open_loop")]
    OpenLoop,
}

impl std::str::FromStr for ControllerKind {
    type Err = ThermoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "pid" => Ok(ControllerKind::Pid),
            "bangbang" | "bang_bang" => Ok(ControllerKind::BangBang),
            "openloop" | "open_loop" => Ok(ControllerKind::OpenLoop),
            other => Err(ThermoError::invalid_config(format!("unknown controller type '{other}'"))),
        }
    }
}

impl std::fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerKind::Pid => write!(f, "pid"),
            ControllerKind::BangBang => write!(f, "bangbang"),
            ControllerKind::OpenLoop => write!(f, "openloop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorLimits {
    min: f64,
    max: f64,
}

impl Default for ActuatorLimits {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl ActuatorLimits {
    /// Limits must satisfy `0 <= min < max <= 1`, the heater's duty range.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(ThermoError::invalid_config("actuator bounds must be finite"));
        }
        if min >= max {
            return Err(ThermoError::invalid_config(format!(
                "actuator_min ({min}) must be below actuator_max ({max})"
            )));
        }
        if min < 0.0 || max > 1.0 {
            return Err(ThermoError::invalid_config(format!(
                "actuator range [{min}, {max}] must lie within [0, 1]"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// NaN maps to `min` so a corrupted computation leaves the heater off.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() { self.min } else { value.clamp(self.min, self.max) }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Construct the controller variant selected by `config.kind`.
pub fn build_controller(config: &ControllerConfig) -> Result<Box<dyn Controller>> {
    let limits = ActuatorLimits::new(config.actuator_min, config.actuator_max)?;
    let controller: Box<dyn Controller> = match config.kind {
        ControllerKind::Pid => Box::new(PidController::new(
            config.kp,
            config.ki,
            config.kd,
            limits,
            config.integral_clamp,
        )?),
        ControllerKind::BangBang => Box::new(BangBangController::new(config.hysteresis, limits)?),
        ControllerKind::OpenLoop => Box::new(OpenLoopController::new(
            config.heating_time,
            config.heating_gap,
            config.safety_cutoff,
            limits,
        )?),
    };
    tracing::debug!("Built {} controller: {:?}", config.kind, config);
    Ok(controller)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actuator_limits_validation() {
        assert!(ActuatorLimits::new(0.0, 1.0).is_ok());
        assert!(ActuatorLimits::new(0.5, 0.5).is_err());
        assert!(ActuatorLimits::new(0.8, 0.2).is_err());
        assert!(ActuatorLimits::new(-0.1, 1.0).is_err());
        assert!(ActuatorLimits::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_actuator_clamp() {
        let limits = ActuatorLimits::new(0.1, 0.9).unwrap();
        assert_eq!(limits.clamp(2.0), 0.9);
        assert_eq!(limits.clamp(-2.0), 0.1);
        assert_eq!(limits.clamp(f64::NAN), 0.1);
        assert_eq!(limits.clamp(0.5), 0.5);
    }

    #[test]
    fn test_build_selects_variant() {
        let pid = build_controller(&ControllerConfig::pid(2.0, 0.1, 0.5)).unwrap();
        assert_eq!(pid.kind(), ControllerKind::Pid);
        let bb = build_controller(&ControllerConfig::bang_bang(0.5)).unwrap();
        assert_eq!(bb.kind(), ControllerKind::BangBang);
        let timed = build_controller(&ControllerConfig::open_loop(10.0, 100.0)).unwrap();
        assert_eq!(timed.kind(), ControllerKind::OpenLoop);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("openloop".parse::<ControllerKind>().unwrap(), ControllerKind::OpenLoop);
        assert_eq!(" bang_bang".parse::<ControllerKind>().unwrap(), ControllerKind::BangBang);
        assert!("fuzzy".parse::<ControllerKind>().is_err());
        assert_eq!(ControllerKind::OpenLoop.to_string(), "openloop");
    }

    #[test]
    fn test_build_rejects_bad_config() {
        let mut config = ControllerConfig::pid(2.0, 0.1, 0.5);
        config.actuator_min = 1.0;
        config.actuator_max = 0.0;
        assert!(matches!(build_controller(&config), Err(ThermoError::InvalidConfiguration(_))));
        assert!(build_controller(&ControllerConfig::pid(0.0, 0.1, 0.5)).is_err());
        assert!(build_controller(&ControllerConfig::bang_bang(-1.0)).is_err());
        assert!(build_controller(&ControllerConfig::open_loop(0.0, 100.0)).is_err());
    }
}
