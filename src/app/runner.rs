//! The retry loop at the centre of every measurement.
//!
//! Attempts run strictly one after another against a single device. A run
//! ends successfully the moment `iterations_target` samples have been
//! collected, and aborts with [`RunError::ExceededThreshold`] the moment more
//! than `failure_budget` attempts have failed. Those two conditions are the
//! only exits; nothing else bounds the number of attempts.

use tracing::{debug, error, info, warn};

use crate::app::cleanup::best_effort;
use crate::app::error::{ProbeError, RunError};
use crate::app::models::{Attempt, AttemptOutcome, AttemptRecord, Metrics, MetricSeries, TestRun};
use crate::app::probe::MetricCollector;

/// Result of a run that reached its iteration target.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub series: MetricSeries,
    pub attempts: Vec<AttemptRecord>,
    pub successes: usize,
    pub failures: usize,
}

impl RunOutcome {
    pub fn total_attempts(&self) -> usize {
        self.attempts.len()
    }
}

pub struct TestRunner<'a> {
    trace_id: &'a str,
}

impl<'a> TestRunner<'a> {
    pub fn new(trace_id: &'a str) -> Self {
        Self { trace_id }
    }

    pub fn run(&self, run: &TestRun, collector: &mut dyn MetricCollector) -> Result<RunOutcome, RunError> {
        let required = collector.required_metrics();
        let mut series = MetricSeries::new();
        let mut attempts = Vec::new();
        let mut successes = 0;
        let mut failures = 0;

        info!(
            trace_id = %self.trace_id,
            app = %run.app_name,
            iterations = run.iterations_target,
            failure_budget = run.failure_budget,
            "starting run"
        );

        while successes < run.iterations_target {
            let index = attempts.len();
            let attempt = Attempt {
                index,
                outcome: self.attempt(run, collector, &required, index),
            };

            match &attempt.outcome {
                AttemptOutcome::Success(metrics) => {
                    for metric in &required {
                        if let Some(value) = metrics.get(metric) {
                            series.push(metric, *value);
                        }
                    }
                    successes += 1;
                    debug!(
                        trace_id = %self.trace_id,
                        app = %run.app_name,
                        attempt = index,
                        successes,
                        "attempt succeeded"
                    );
                }
                AttemptOutcome::Failure(err) => {
                    failures += 1;
                    warn!(
                        trace_id = %self.trace_id,
                        app = %run.app_name,
                        attempt = index,
                        failures,
                        kind = err.kind(),
                        error = %err,
                        "attempt failed"
                    );
                }
            }
            attempts.push(AttemptRecord::from(&attempt));

            if failures > run.failure_budget {
                let err = RunError::ExceededThreshold {
                    failures,
                    budget: run.failure_budget,
                    successes,
                    attempts: attempts.len(),
                };
                error!(trace_id = %self.trace_id, app = %run.app_name, error = %err, "run aborted");
                return Err(err);
            }
        }

        info!(
            trace_id = %self.trace_id,
            app = %run.app_name,
            successes,
            failures,
            attempts = attempts.len(),
            "run complete"
        );
        Ok(RunOutcome {
            series,
            attempts,
            successes,
            failures,
        })
    }

    fn attempt(
        &self,
        run: &TestRun,
        collector: &mut dyn MetricCollector,
        required: &[String],
        index: usize,
    ) -> AttemptOutcome {
        let result = self.probe_once(run, collector, required, index);
        best_effort("kill running apps", self.trace_id, || collector.cleanup());
        match result {
            Ok(metrics) => AttemptOutcome::Success(metrics),
            Err(err) => AttemptOutcome::Failure(err),
        }
    }

    fn probe_once(
        &self,
        run: &TestRun,
        collector: &mut dyn MetricCollector,
        required: &[String],
        index: usize,
    ) -> Result<Metrics, ProbeError> {
        if collector.requires_connection() {
            collector.ensure_connection()?;
        }
        if !run.delay.is_zero() {
            std::thread::sleep(run.delay);
        }
        let metrics = collector.collect(index)?;
        check_required(&run.app_name, &metrics, required, index)?;
        Ok(metrics)
    }
}

/// A required metric that is absent, zero or not a number fails the attempt.
fn check_required(app_name: &str, metrics: &Metrics, required: &[String], index: usize) -> Result<(), ProbeError> {
    for metric in required {
        let usable = metrics
            .get(metric)
            .map(|value| value.is_finite() && *value != 0.0)
            .unwrap_or(false);
        if !usable {
            return Err(ProbeError::MissingMetric {
                app: app_name.to_string(),
                metric: metric.clone(),
                iteration: index + 1,
            });
        }
    }
    Ok(())
}
