//! Error taxonomy shared by the dataset store, controllers, engine and harness.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ThermoError>;

#[derive(Debug, Error)]
pub enum ThermoError {
    #[error("dataset not found: {}", path.display())]
    DatasetNotFound { path: PathBuf },

    #[error("malformed dataset {}: {reason}", path.display())]
    DatasetFormat { path: PathBuf, reason: String },

    #[error(
        "dataset {} is not time-ordered: row {row} has timestamp {timestamp} after {previous}",
        path.display()
    )]
    DatasetOrdering {
        path: PathBuf,
        row: usize,
        previous: f64,
        timestamp: f64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("step count mismatch: expected {expected} steps, dataset has {actual}")]
    StepCountMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ThermoError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ThermoError::InvalidConfiguration(msg.into())
    }

    pub fn is_dataset_error(&self) -> bool {
        matches!(
            self,
            ThermoError::DatasetNotFound { .. }
                | ThermoError::DatasetFormat { .. }
                | ThermoError::DatasetOrdering { .. }
        )
    }

    /// Owned copy, so one failed dataset load can be reported against every
    /// case that names the dataset. Wrapped library errors come back as IO
    /// errors carrying the same message.
    pub fn duplicate(&self) -> Self {
        match self {
            ThermoError::DatasetNotFound { path } => ThermoError::DatasetNotFound { path: path.clone() },
            ThermoError::DatasetFormat { path, reason } => ThermoError::DatasetFormat {
                path: path.clone(),
                reason: reason.clone(),
            },
            ThermoError::DatasetOrdering {
                path,
                row,
                previous,
                timestamp,
            } => ThermoError::DatasetOrdering {
                path: path.clone(),
                row: *row,
                previous: *previous,
                timestamp: *timestamp,
            },
            ThermoError::InvalidConfiguration(msg) => ThermoError::InvalidConfiguration(msg.clone()),
            ThermoError::StepCountMismatch { expected, actual } => ThermoError::StepCountMismatch {
                expected: *expected,
                actual: *actual,
            },
            ThermoError::Io(e) => ThermoError::Io(std::io::Error::new(e.kind(), e.to_string())),
            other => ThermoError::Io(std::io::Error::other(other.to_string())),
        }
    }

    /// Whether a batch may carry on after this error. Only a bad
    /// configuration is fatal to the run that was being set up.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ThermoError::InvalidConfiguration(_))
    }
}
