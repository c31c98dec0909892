// src/controller/pid.rs - PID temperature controller with integral clamping
use super::{ActuatorLimits, Controller, ControllerKind};
use crate::error::{Result, ThermoError};

/// Standard PID: `u = Kp*e + Ki*∫e dt + Kd*de/dt`, clamped to the actuator range.
///
/// The integral accumulator is bounded to `±integral_clamp` on every update,
/// which keeps windup finite while the heater is saturated.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    limits: ActuatorLimits,
    integral_clamp: f64,

    integral: f64,
    previous_error: f64,
}

impl PidController {
    pub fn new(kp: f64, ki: f64, kd: f64, limits: ActuatorLimits, integral_clamp: f64) -> Result<Self> {
        for (name, gain) in [("kp", kp), ("ki", ki), ("kd", kd)] {
            if !gain.is_finite() {
                return Err(ThermoError::invalid_config(format!("{name} must be finite, got {gain}")));
            }
            if gain <= 0.0 {
                return Err(ThermoError::invalid_config(format!("{name} must be > 0, got {gain}")));
            }
        }
        if !(integral_clamp.is_finite() && integral_clamp > 0.0) {
            return Err(ThermoError::invalid_config(format!(
                "integral_clamp must be a positive finite number, got {integral_clamp}"
            )));
        }
        Ok(Self {
            kp,
            ki,
            kd,
            limits,
            integral_clamp,
            integral: 0.0,
            previous_error: 0.0,
        })
    }

    pub fn gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn previous_error(&self) -> f64 {
        self.previous_error
    }

    pub fn integral_clamp(&self) -> f64 {
        self.integral_clamp
    }
}

impl Controller for PidController {
    fn compute(&mut self, target: f64, measured: f64, dt: f64) -> f64 {
        let error = target - measured;
        if !error.is_finite() || !dt.is_finite() {
            tracing::warn!("PID received non-finite input (error={error}, dt={dt}); holding heater at minimum");
            return self.limits.min();
        }

        if dt > 0.0 {
            self.integral = (self.integral + error * dt).clamp(-self.integral_clamp, self.integral_clamp);
        }
        let derivative = if dt > 0.0 {
            (error - self.previous_error) / dt
        } else {
            0.0
        };
        self.previous_error = error;

        let output = self.kp * error + self.ki * self.integral + self.kd * derivative;
        tracing::trace!(
            "PID e={:.3} i={:.3} d={:.3} raw={:.3}",
            error,
            self.integral,
            derivative,
            output
        );
        self.limits.clamp(output)
    }

    fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
    }

    fn actuator_range(&self) -> ActuatorLimits {
        self.limits
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::Pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(kp: f64, ki: f64, kd: f64, clamp: f64) -> PidController {
        PidController::new(kp, ki, kd, ActuatorLimits::default(), clamp).unwrap()
    }

    #[test]
    fn test_first_step_sums_all_terms() {
        let mut c = pid(0.05, 0.02, 0.01, 10.0);
        // e=5: integral 5, derivative 5 since previous error starts at 0.
        let out = c.compute(40.0, 35.0, 1.0);
        assert!((out - (0.25 + 0.1 + 0.05)).abs() < 1e-12);
    }

    #[test]
    fn test_output_is_clamped() {
        let mut c = pid(2.0, 0.1, 0.5, 10.0);
        assert_eq!(c.compute(40.0, 20.0, 1.0), 1.0);
        assert_eq!(c.compute(20.0, 40.0, 1.0), 0.0);
    }

    #[test]
    fn test_integral_accumulates_and_clamps() {
        let mut c = pid(1.0, 0.1, 0.1, 5.0);
        c.compute(21.0, 20.0, 2.0);
        assert!((c.integral() - 2.0).abs() < 1e-12);
        for _ in 0..100 {
            c.compute(100.0, 20.0, 1.0);
        }
        assert_eq!(c.integral(), 5.0);
        for _ in 0..100 {
            c.compute(0.0, 20.0, 1.0);
        }
        assert_eq!(c.integral(), -5.0);
    }

    #[test]
    fn test_zero_dt_skips_derivative() {
        let mut c = pid(0.01, 0.5, 1000.0, 10.0);
        let out = c.compute(40.0, 30.0, 0.0);
        // Integral and derivative stay at zero: 0.01 * 10
        assert!((out - 0.1).abs() < 1e-12);
        assert_eq!(c.integral(), 0.0);
        assert_eq!(c.previous_error(), 10.0);
    }

    #[test]
    fn test_derivative_uses_previous_error() {
        let mut c = pid(0.01, 0.001, 0.01, 100.0);
        c.compute(40.0, 30.0, 1.0); // e=10
        let out = c.compute(40.0, 35.0, 1.0); // e=5, integral 15, de/dt=-5
        assert!((out - (0.05 + 0.015 - 0.05)).abs() < 1e-12);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut c = pid(2.0, 0.1, 0.5, 10.0);
        c.compute(40.0, 20.0, 1.0);
        assert!(c.integral() != 0.0);
        c.reset();
        assert_eq!(c.integral(), 0.0);
        assert_eq!(c.previous_error(), 0.0);
    }

    #[test]
    fn test_non_finite_input_holds_minimum() {
        let mut c = pid(2.0, 0.1, 0.5, 10.0);
        assert_eq!(c.compute(40.0, f64::NAN, 1.0), 0.0);
        assert_eq!(c.integral(), 0.0);
    }

    #[test]
    fn test_invalid_gains() {
        let limits = ActuatorLimits::default();
        assert!(PidController::new(0.0, 0.1, 0.5, limits, 5.0).is_err());
        assert!(PidController::new(-1.0, 0.1, 0.5, limits, 5.0).is_err());
        assert!(PidController::new(1.0, -0.1, 0.5, limits, 5.0).is_err());
        assert!(PidController::new(1.0, 0.1, f64::NAN, limits, 5.0).is_err());
        assert!(PidController::new(1.0, 0.1, 0.5, limits, 0.0).is_err());
    }

    #[test]
    fn test_zero_gains_rejected() {
        let limits = ActuatorLimits::default();
        for (kp, ki, kd) in [(0.0, 0.1, 0.5), (1.0, 0.0, 0.5), (1.0, 0.1, 0.0)] {
            assert!(matches!(
                PidController::new(kp, ki, kd, limits, 5.0),
                Err(ThermoError::InvalidConfiguration(_))
            ));
        }
    }
}
