//! Results written by the in-app perf framework: per-test durations plus app
//! and system memory readings, regrouped into reportable series.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::app::error::ConfigError;
use crate::app::models::{MetricSeries, ReportRecord};

const MEMORY_METRICS: [&str; 4] = ["uss", "pss", "rss", "vsize"];

#[derive(Debug, Default, Deserialize)]
struct RawStats {
    application: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMemory {
    uss: Option<f64>,
    pss: Option<f64>,
    rss: Option<f64>,
    vsize: Option<f64>,
}

impl RawMemory {
    fn readings(&self) -> [(&'static str, Option<f64>); 4] {
        [
            (MEMORY_METRICS[0], self.uss),
            (MEMORY_METRICS[1], self.pss),
            (MEMORY_METRICS[2], self.rss),
            (MEMORY_METRICS[3], self.vsize),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawMemorySample {
    app: Option<RawMemory>,
    system: Option<RawMemory>,
}

#[derive(Debug, Deserialize)]
struct RawPass {
    title: String,
    #[serde(default, rename = "mozPerfDurations")]
    durations: Vec<f64>,
    #[serde(default, rename = "mozPerfMemory")]
    memory: Vec<RawMemorySample>,
}

#[derive(Debug, Deserialize)]
struct RawAppResults {
    #[serde(default)]
    stats: RawStats,
    #[serde(default)]
    passes: Vec<RawPass>,
}

/// One app's results, regrouped for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct AppPerfResults {
    pub app_name: String,
    /// Test title (spaces replaced) -> durations.
    pub durations: MetricSeries,
    /// Memory item (`uss`, `system_pss`, ...) -> `{"<app>_memory": readings}`.
    pub memory: BTreeMap<String, MetricSeries>,
}

impl AppPerfResults {
    /// Durations are filed under the app; each memory item is its own suite.
    pub fn records(&self) -> Vec<ReportRecord> {
        let mut records = vec![ReportRecord::new(&self.app_name, self.durations.clone())];
        records.extend(
            self.memory
                .iter()
                .filter(|(_, series)| !series.is_empty())
                .map(|(item, series)| ReportRecord::new(item, series.clone())),
        );
        records
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedApp {
    Results(AppPerfResults),
    /// The app reported no passing tests.
    NoPasses(String),
}

fn memory_key(app_name: &str) -> String {
    format!("{app_name}_memory")
}

fn regroup(raw: RawAppResults) -> ParsedApp {
    let app_name = raw.stats.application.unwrap_or_default();
    if raw.passes.is_empty() {
        return ParsedApp::NoPasses(app_name);
    }

    let app_memory = memory_key(&app_name);
    let mut durations = MetricSeries::new();
    let mut memory: BTreeMap<String, MetricSeries> = BTreeMap::new();

    for pass in raw.passes {
        let metric = pass.title.trim().replace(' ', "_");
        for value in pass.durations {
            durations.push(&metric, value);
        }
        for sample in pass.memory {
            let scopes = [("", sample.app), ("system_", sample.system)];
            for (prefix, readings) in scopes {
                let Some(readings) = readings else {
                    continue;
                };
                for (name, value) in readings.readings() {
                    // Zero readings are dropped along with absent ones.
                    if let Some(value) = value.filter(|value| *value != 0.0) {
                        memory
                            .entry(format!("{prefix}{name}"))
                            .or_default()
                            .push(&app_memory, value);
                    }
                }
            }
        }
    }

    ParsedApp::Results(AppPerfResults {
        app_name,
        durations,
        memory,
    })
}

pub fn parse_results(json: &str) -> Result<Vec<ParsedApp>, String> {
    let raw: Vec<RawAppResults> = serde_json::from_str(json).map_err(|err| err.to_string())?;
    Ok(raw.into_iter().map(regroup).collect())
}

pub fn load_results(path: &Path) -> Result<Vec<ParsedApp>, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidResults {
        path: path.display().to_string(),
        message,
    };
    let contents = fs::read_to_string(path).map_err(|err| invalid(err.to_string()))?;
    parse_results(&contents).map_err(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RESULTS: &str = r#"[
      {
        "stats": { "application": "calendar", "suites": 1, "tests": 2 },
        "passes": [
          {
            "title": "startup > month view",
            "mozPerfDurations": [812, 790],
            "mozPerfMemory": [
              { "app": { "uss": 10.5, "pss": 12.1, "rss": 20.0, "vsize": 0 },
                "system": { "uss": 50.0, "pss": 55.0 } }
            ]
          },
          {
            "title": " week view ",
            "mozPerfDurations": [301.5]
          }
        ]
      },
      { "stats": { "application": "clock" }, "passes": [] }
    ]"#;

    #[test]
    fn regroups_durations_and_memory() {
        let parsed = parse_results(RESULTS).expect("parsed");
        assert_eq!(parsed.len(), 2);
        let ParsedApp::Results(calendar) = &parsed[0] else {
            panic!("expected results for calendar");
        };
        assert_eq!(calendar.app_name, "calendar");
        assert_eq!(calendar.durations.get("startup_>_month_view"), Some(&[812.0, 790.0][..]));
        assert_eq!(calendar.durations.get("week_view"), Some(&[301.5][..]));
        assert_eq!(calendar.memory["uss"].get("calendar_memory"), Some(&[10.5][..]));
        assert_eq!(calendar.memory["system_pss"].get("calendar_memory"), Some(&[55.0][..]));
        assert!(!calendar.memory.contains_key("vsize"));
        assert!(!calendar.memory.contains_key("system_rss"));
        assert_eq!(parsed[1], ParsedApp::NoPasses("clock".to_string()));
    }

    #[test]
    fn records_file_memory_items_as_suites() {
        let parsed = parse_results(RESULTS).expect("parsed");
        let ParsedApp::Results(calendar) = &parsed[0] else {
            panic!("expected results for calendar");
        };
        let suites: Vec<String> = calendar.records().into_iter().map(|record| record.test_suite).collect();
        assert_eq!(
            suites,
            vec!["calendar", "pss", "rss", "system_pss", "system_uss", "uss"]
        );
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("results.json");
        std::fs::write(&path, "{\"not\": \"a list\"}").expect("write");
        assert!(matches!(load_results(&path), Err(ConfigError::InvalidResults { .. })));
        assert!(matches!(
            load_results(&tmp.path().join("missing.json")),
            Err(ConfigError::InvalidResults { .. })
        ));
    }
}
