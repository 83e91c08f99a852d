use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::app::error::{ConfigError, ProbeError};

/// Metric name -> value for one successful attempt.
pub type Metrics = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Startup,
    #[value(name = "scrollfps")]
    ScrollFps,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Startup => "startup",
            TestType::ScrollFps => "scrollfps",
        }
    }
}

/// One invocation of the harness against one app/probe combination.
#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
    pub app_name: String,
    pub iterations_target: usize,
    pub failure_budget: usize,
    pub delay: Duration,
    pub restart_policy: bool,
    pub reset_policy: bool,
}

impl TestRun {
    pub fn new(
        app_name: impl Into<String>,
        iterations_target: usize,
        delay: Duration,
        restart_policy: bool,
        reset_policy: bool,
    ) -> Result<Self, ConfigError> {
        if iterations_target == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if reset_policy && !restart_policy {
            return Err(ConfigError::ResetWithoutRestart);
        }
        Ok(Self {
            app_name: app_name.into(),
            iterations_target,
            failure_budget: failure_budget(iterations_target),
            delay,
            restart_policy,
            reset_policy,
        })
    }

    /// Suite name used when reporting: lower case, spaces replaced.
    pub fn suite_name(&self) -> String {
        suite_name(&self.app_name)
    }
}

/// floor(iterations * 0.2), computed in integers.
pub fn failure_budget(iterations_target: usize) -> usize {
    iterations_target / 5
}

pub fn suite_name(app_name: &str) -> String {
    app_name.replace(' ', "_").to_lowercase()
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Success(Metrics),
    Failure(ProbeError),
}

#[derive(Debug)]
pub struct Attempt {
    pub index: usize,
    pub outcome: AttemptOutcome,
}

/// Compact record of an attempt kept after the run, for reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttemptRecord {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Attempt> for AttemptRecord {
    fn from(attempt: &Attempt) -> Self {
        match &attempt.outcome {
            AttemptOutcome::Success(_) => AttemptRecord {
                index: attempt.index,
                success: true,
                error_kind: None,
                error: None,
            },
            AttemptOutcome::Failure(err) => AttemptRecord {
                index: attempt.index,
                success: false,
                error_kind: Some(err.kind()),
                error: Some(err.to_string()),
            },
        }
    }
}

/// Metric name -> samples, one appended per successful attempt in attempt
/// order. Values are never removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MetricSeries {
    series: BTreeMap<String, Vec<f64>>,
}

impl MetricSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metric: &str, value: f64) {
        self.series.entry(metric.to_string()).or_default().push(value);
    }

    pub fn get(&self, metric: &str) -> Option<&[f64]> {
        self.series.get(metric).map(Vec::as_slice)
    }

    pub fn len_of(&self, metric: &str) -> usize {
        self.series.get(metric).map(Vec::len).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<f64>)> {
        self.series.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(Vec::is_empty)
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }
}

impl FromIterator<(String, Vec<f64>)> for MetricSeries {
    fn from_iter<I: IntoIterator<Item = (String, Vec<f64>)>>(iter: I) -> Self {
        Self {
            series: iter.into_iter().collect(),
        }
    }
}

/// Payload handed to a report publisher.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportRecord {
    pub test_suite: String,
    pub series: MetricSeries,
}

impl ReportRecord {
    pub fn new(app_name: &str, series: MetricSeries) -> Self {
        Self {
            test_suite: suite_name(app_name),
            series,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_budget_is_twenty_percent_floored() {
        assert_eq!(failure_budget(1), 0);
        assert_eq!(failure_budget(4), 0);
        assert_eq!(failure_budget(5), 1);
        assert_eq!(failure_budget(10), 2);
        assert_eq!(failure_budget(15), 3);
        assert_eq!(failure_budget(30), 6);
    }

    #[test]
    fn test_run_rejects_reset_without_restart() {
        let err = TestRun::new("Clock", 10, Duration::from_secs(1), false, true).unwrap_err();
        assert_eq!(err, ConfigError::ResetWithoutRestart);
    }

    #[test]
    fn test_run_rejects_zero_iterations() {
        let err = TestRun::new("Clock", 0, Duration::ZERO, true, false).unwrap_err();
        assert_eq!(err, ConfigError::ZeroIterations);
    }

    #[test]
    fn test_run_derives_budget_and_suite() {
        let run = TestRun::new("Cost Control", 10, Duration::ZERO, true, true).expect("run");
        assert_eq!(run.failure_budget, 2);
        assert_eq!(run.suite_name(), "cost_control");
    }

    #[test]
    fn metric_series_appends_in_order() {
        let mut series = MetricSeries::new();
        assert!(series.is_empty());
        series.push("cold_load_time", 3.0);
        series.push("cold_load_time", 1.0);
        series.push("fps", 58.5);
        assert_eq!(series.get("cold_load_time"), Some(&[3.0, 1.0][..]));
        assert_eq!(series.len_of("fps"), 1);
        assert_eq!(series.len_of("missing"), 0);
        assert_eq!(series.metric_names(), vec!["cold_load_time", "fps"]);
    }

    #[test]
    fn attempt_record_keeps_error_kind() {
        let attempt = Attempt {
            index: 2,
            outcome: AttemptOutcome::Failure(ProbeError::AppLaunch {
                app: "Clock".to_string(),
            }),
        };
        let record = AttemptRecord::from(&attempt);
        assert!(!record.success);
        assert_eq!(record.error_kind, Some("app_launch"));
        assert_eq!(record.error.as_deref(), Some("error launching app 'Clock'"));
    }
}
