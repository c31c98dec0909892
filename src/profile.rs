// src/profile.rs - Stepwise time profiles (setpoints, ambient drift, contents)
use serde::{Deserialize, Serialize};

use crate::error::{Result, ThermoError};

/// One breakpoint of a stepwise profile: `value` holds from `at` until the next breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Setpoint {
    pub at: f64,
    #[serde(alias = "temperature")]
    pub value: f64,
}

/// A piecewise-constant function of time.
///
/// In TOML a profile is either a bare number (constant) or an array of
/// `{ at = <seconds>, value = <value> }` tables (`temperature` is accepted
/// for `value`, any other key is rejected). Before the first
/// breakpoint the first value applies.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Profile {
    Constant(f64),
    Steps(Vec<Setpoint>),
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Constant(0.0)
    }
}

impl Profile {
    pub fn constant(value: f64) -> Self {
        Profile::Constant(value)
    }

    pub fn steps(points: impl IntoIterator<Item = (f64, f64)>) -> Result<Self> {
        let profile = Profile::Steps(
            points
                .into_iter()
                .map(|(at, value)| Setpoint { at, value })
                .collect(),
        );
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Profile::Constant(v) if !v.is_finite() => {
                Err(ThermoError::invalid_config(format!("profile value {v} is not finite")))
            }
            Profile::Constant(_) => Ok(()),
            Profile::Steps(points) => {
                if points.is_empty() {
                    return Err(ThermoError::invalid_config("stepwise profile has no breakpoints"));
                }
                for pair in points.windows(2) {
                    if pair[1].at <= pair[0].at {
                        return Err(ThermoError::invalid_config(format!(
                            "profile breakpoints must be strictly increasing in time ({} then {})",
                            pair[0].at, pair[1].at
                        )));
                    }
                }
                if let Some(bad) = points.iter().find(|p| !p.at.is_finite() || !p.value.is_finite()) {
                    return Err(ThermoError::invalid_config(format!(
                        "profile breakpoint at {} has a non-finite component",
                        bad.at
                    )));
                }
                Ok(())
            }
        }
    }

    pub fn value_at(&self, t: f64) -> f64 {
        match self {
            Profile::Constant(v) => *v,
            Profile::Steps(points) => {
                let mut current = points.first().map(|p| p.value).unwrap_or(0.0);
                for p in points {
                    if p.at <= t {
                        current = p.value;
                    } else {
                        break;
                    }
                }
                current
            }
        }
    }

    pub fn initial(&self) -> f64 {
        self.value_at(f64::NEG_INFINITY)
    }
}
