use serde::Serialize;
use std::fmt;

use thiserror::Error;

use crate::app::aggregate::AggregateError;
use crate::app::session::SessionError;

#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_VALIDATION", message, trace_id)
    }

    pub fn dependency(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_DEPENDENCY", message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_SYSTEM", message, trace_id)
    }

    pub fn timeout(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new("ERR_TIMEOUT", message, trace_id)
    }

    pub fn is_timeout(&self) -> bool {
        self.code == "ERR_TIMEOUT"
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}

/// Failure of a single probe attempt. Every variant is retryable: the test
/// runner counts it against the failure budget and tries again.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("error launching app '{app}'")]
    AppLaunch { app: String },

    #[error("{app} missing {metric} metric in iteration {iteration}")]
    MissingMetric {
        app: String,
        metric: String,
        iteration: usize,
    },

    #[error("unable to start fps measurement for '{app}'")]
    Fps { app: String },

    #[error("no network connection available: {0}")]
    NetworkConnection(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("unable to populate test data: {0}")]
    Populate(String),

    #[error("remote session failure: {0}")]
    Session(#[from] SessionError),

    #[error("device command failed: {0}")]
    Device(#[from] AppError),
}

impl ProbeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::AppLaunch { .. } => "app_launch",
            ProbeError::MissingMetric { .. } => "missing_metric",
            ProbeError::Fps { .. } => "fps",
            ProbeError::NetworkConnection(_) => "network_connection",
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Populate(_) => "populate",
            ProbeError::Session(_) => "session",
            ProbeError::Device(_) => "device",
        }
    }
}

/// Terminal failure of one app's run. Caught by the per-app loop; never
/// terminates the process.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(
        "Exceeded failure threshold for gathering results! ({failures} failures > budget {budget}, {successes} successes after {attempts} attempts)"
    )]
    ExceededThreshold {
        failures: usize,
        budget: usize,
        successes: usize,
        attempts: usize,
    },

    #[error("setup failed for '{app}': {source}")]
    Setup {
        app: String,
        #[source]
        source: ProbeError,
    },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Malformed configuration, surfaced before any device interaction.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("--reset requires restarting B2G (remove --no-restart)")]
    ResetWithoutRestart,

    #[error("--iterations must be greater than zero")]
    ZeroIterations,

    #[error("{field} must be a non-negative number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f64 },

    #[error("invalid address '{0}': expected host:port")]
    InvalidAddress(String),

    #[error("--testvars file does not exist: {0}")]
    MissingTestvars(String),

    #[error("--testvars file is not a JSON object: {0}")]
    InvalidTestvars(String),

    #[error("must specify at least one app name")]
    NoApps,

    #[error("invalid --adb-path: {0}")]
    InvalidAdb(String),

    #[error("unable to read settings file {path}: {message}")]
    InvalidSettings { path: String, message: String },

    #[error("unable to read results file {path}: {message}")]
    InvalidResults { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_error_display_includes_code() {
        let err = AppError::dependency("adb missing", "trace-1");
        assert_eq!(err.to_string(), "adb missing (ERR_DEPENDENCY)");
        assert!(!err.is_timeout());
        assert!(AppError::timeout("slow", "trace-1").is_timeout());
    }

    #[test]
    fn missing_metric_message_names_iteration() {
        let err = ProbeError::MissingMetric {
            app: "Clock".to_string(),
            metric: "cold_load_time".to_string(),
            iteration: 4,
        };
        assert_eq!(err.to_string(), "Clock missing cold_load_time metric in iteration 4");
        assert_eq!(err.kind(), "missing_metric");
    }
}
