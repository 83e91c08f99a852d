use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::app::models::MetricSeries;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("no samples recorded for metric '{0}'")]
    NoSamples(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricSummary {
    pub median: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
    pub min: f64,
    pub count: usize,
    pub samples: Vec<f64>,
}

impl fmt::Display for MetricSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let all = self
            .samples
            .iter()
            .map(|value| format_number(*value))
            .collect::<Vec<_>>()
            .join(",");
        write!(
            f,
            "median:{}, mean:{}, std:{}, max:{}, min:{}, all:{}",
            format_number(self.median),
            format_number(self.mean),
            format_number(self.std_dev),
            format_number(self.max),
            format_number(self.min),
            all
        )
    }
}

/// Summary statistics for one metric. An empty sequence has no defined
/// summary; on the success path every sequence holds exactly one sample per
/// required iteration.
pub fn summarize_metric(metric: &str, samples: &[f64]) -> Result<MetricSummary, AggregateError> {
    if samples.is_empty() {
        return Err(AggregateError::NoSamples(metric.to_string()));
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let count = samples.len();
    let mean = samples.iter().sum::<f64>() / count as f64;
    let variance = samples
        .iter()
        .map(|value| {
            let delta = value - mean;
            delta * delta
        })
        .sum::<f64>()
        / count as f64;

    Ok(MetricSummary {
        median: median_sorted(&sorted),
        mean,
        std_dev: variance.sqrt(),
        max: sorted[count - 1],
        min: sorted[0],
        count,
        samples: samples.to_vec(),
    })
}

pub fn summarize(series: &MetricSeries) -> Result<BTreeMap<String, MetricSummary>, AggregateError> {
    series
        .iter()
        .map(|(metric, samples)| Ok((metric.clone(), summarize_metric(metric, samples)?)))
        .collect()
}

/// Human-readable summary lines, one per metric.
pub fn summary_lines(app_name: &str, summaries: &BTreeMap<String, MetricSummary>) -> Vec<String> {
    summaries
        .iter()
        .map(|(metric, summary)| format!("Results for {app_name}, {metric}: {summary}"))
        .collect()
}

fn median_sorted(sorted: &[f64]) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    let mid = n / 2;
    if n % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Samples reaching here are finite: the runner rejects NaN and infinite
/// metrics as missing before they enter a series.
fn format_number(value: f64) -> String {
    debug_assert!(value.is_finite(), "non-finite sample {value}");
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.3}")
    }
}
