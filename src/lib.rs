//! Closed-loop temperature control for a heated box.
//!
//! The crate couples a lumped thermal model of the box ([`plant`]) with
//! feedback controllers ([`controller`]), runs them against each other or
//! against recorded traces ([`simulator`], [`dataset`]), scores the
//! resulting runs ([`validation`]) and flags recordings that stop matching
//! the model ([`monitor`]).

pub mod config;
pub mod controller;
pub mod dataset;
pub mod error;
pub mod monitor;
pub mod plant;
pub mod profile;
pub mod simulator;
pub mod validation;

pub use config::{ScenarioConfig, SuiteConfig, load_config, load_suite};
pub use controller::{
    ActuatorLimits, BangBangController, Controller, ControllerKind, OpenLoopController, PidController,
};
pub use dataset::{Dataset, TemperatureSample};
pub use error::{Result, ThermoError};
pub use monitor::{KalmanEstimator, MonitorConfig, MonitorReport, monitor_dataset};
pub use plant::PlantState;
pub use profile::Profile;
pub use simulator::{RunResult, RunSample, replay_open_loop, run_scenario, simulate_closed_loop};
pub use validation::{Metrics, ToleranceSpec, ValidationReport, assert_within, evaluate};
