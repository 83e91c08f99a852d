//! Hand-off of finished runs to the results service, or to stdout when the
//! service cannot be used.

pub mod datazilla;

use std::collections::BTreeMap;

use http::Uri;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::app::config::ResultsSettings;
use crate::app::models::ReportRecord;
use crate::app::version::BuildInfo;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("unable to reach results service: {0}")]
    Transport(String),

    #[error("results service rejected the submission with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unable to encode results: {0}")]
    Encode(String),
}

/// Sink for one finished run. Failures are reported to the caller, who logs
/// them; nothing is retried.
pub trait ReportPublisher {
    fn submit(&mut self, record: &ReportRecord) -> Result<(), PublishError>;
}

/// Where results go and who they are filed under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultsEnvelope {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub project: Option<String>,
    pub branch: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub build: BuildInfo,
}

impl ResultsEnvelope {
    pub fn new(results: &ResultsSettings, build: BuildInfo) -> Self {
        let uri = results.url.trim().parse::<Uri>().ok();
        Self {
            protocol: uri.as_ref().and_then(Uri::scheme_str).map(str::to_string),
            host: uri.as_ref().and_then(Uri::host).map(str::to_string),
            port: uri.as_ref().and_then(Uri::port_u16),
            project: results.project.clone(),
            branch: results.branch.clone(),
            key: results.key.clone(),
            secret: results.secret.clone(),
            build,
        }
    }

    /// `protocol://host[:port]`, when both parts are known.
    pub fn base_url(&self) -> Option<String> {
        let protocol = self.protocol.as_deref()?;
        let host = self.host.as_deref()?;
        Some(match self.port {
            Some(port) => format!("{protocol}://{host}:{port}"),
            None => format!("{protocol}://{host}"),
        })
    }

    pub fn required_fields(&self) -> RequiredFieldSet {
        [
            ("gaia revision", self.build.gaia_revision.clone()),
            ("gecko revision", self.build.gecko_revision.clone()),
            ("build revision", self.build.build_revision.clone()),
            ("protocol", self.protocol.clone()),
            ("host", self.host.clone()),
            ("project", self.project.clone()),
            ("branch", self.branch.clone()),
            ("oauth key", self.key.clone()),
            ("oauth secret", self.secret.clone()),
            ("machine name", Some(self.build.machine_name().to_string())),
            ("os version", self.build.os_version.clone()),
            ("id", self.build.build_id.clone()),
        ]
        .into_iter()
        .collect()
    }
}

/// Identifying fields the results service needs, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFieldSet {
    fields: BTreeMap<&'static str, Option<String>>,
}

impl RequiredFieldSet {
    pub fn insert(&mut self, name: &'static str, value: Option<String>) {
        self.fields.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|value| value.as_deref())
    }

    /// Names whose value is absent or blank.
    pub fn missing(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|(_, value)| value.as_deref().map(str::trim).unwrap_or("").is_empty())
            .map(|(name, _)| *name)
            .collect()
    }
}

impl FromIterator<(&'static str, Option<String>)> for RequiredFieldSet {
    fn from_iter<I: IntoIterator<Item = (&'static str, Option<String>)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Decided once per process. A missing field turns publishing off for every
/// run; results are then printed instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishGate {
    missing: Vec<&'static str>,
}

impl PublishGate {
    pub fn evaluate(fields: &RequiredFieldSet, trace_id: &str) -> Self {
        let missing = fields.missing();
        for field in &missing {
            warn!(trace_id = %trace_id, field = %field, "missing required results field");
        }
        if !missing.is_empty() {
            warn!(trace_id = %trace_id, "reports will not be submitted to the results service");
        }
        Self { missing }
    }

    pub fn submit_report(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn missing(&self) -> &[&'static str] {
        &self.missing
    }
}

#[derive(Debug)]
pub enum Delivery {
    Published,
    Failed(PublishError),
    /// The gate is closed; the rendered line goes to stdout.
    Local(String),
}

pub fn deliver(
    gate: &PublishGate,
    publisher: &mut dyn ReportPublisher,
    record: &ReportRecord,
    trace_id: &str,
) -> Delivery {
    if !gate.submit_report() {
        return Delivery::Local(local_report(record));
    }
    match publisher.submit(record) {
        Ok(()) => {
            info!(trace_id = %trace_id, suite = %record.test_suite, "results submitted");
            Delivery::Published
        }
        Err(err) => {
            error!(trace_id = %trace_id, suite = %record.test_suite, error = %err, "results submission failed");
            Delivery::Failed(err)
        }
    }
}

pub fn local_report(record: &ReportRecord) -> String {
    let results = serde_json::to_string(&record.series).unwrap_or_else(|_| "{}".to_string());
    format!("Results: {results}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::MetricSeries;
    use crate::app::testing::RecordingPublisher;

    fn complete_build() -> BuildInfo {
        BuildInfo {
            gaia_revision: Some("7b1e2c3d4f".to_string()),
            gecko_revision: Some("4e2d6f0a".to_string()),
            build_revision: Some("b2a91c7".to_string()),
            os_version: Some("1.0.1.0-prerelease".to_string()),
            build_id: Some("20130601070207".to_string()),
            machine_name: None,
        }
    }

    fn complete_settings() -> ResultsSettings {
        ResultsSettings {
            url: "https://datazilla.mozilla.org".to_string(),
            project: Some("b2g".to_string()),
            branch: Some("master".to_string()),
            key: Some("key".to_string()),
            secret: Some("secret".to_string()),
        }
    }

    fn record() -> ReportRecord {
        let series: MetricSeries = [("cold_load_time".to_string(), vec![812.0, 790.0])]
            .into_iter()
            .collect();
        ReportRecord::new("Cost Control", series)
    }

    #[test]
    fn envelope_splits_results_url() {
        let mut settings = complete_settings();
        settings.url = "http://localhost:8000".to_string();
        let envelope = ResultsEnvelope::new(&settings, BuildInfo::default());
        assert_eq!(envelope.protocol.as_deref(), Some("http"));
        assert_eq!(envelope.host.as_deref(), Some("localhost"));
        assert_eq!(envelope.base_url().as_deref(), Some("http://localhost:8000"));
    }

    #[test]
    fn complete_envelope_opens_the_gate() {
        let envelope = ResultsEnvelope::new(&complete_settings(), complete_build());
        let fields = envelope.required_fields();
        assert_eq!(fields.get("machine name"), Some("unknown"));
        let gate = PublishGate::evaluate(&fields, "trace");
        assert!(gate.submit_report());
        assert!(gate.missing().is_empty());
    }

    #[test]
    fn missing_project_keeps_every_run_local() {
        let mut settings = complete_settings();
        settings.project = None;
        let envelope = ResultsEnvelope::new(&settings, complete_build());
        let gate = PublishGate::evaluate(&envelope.required_fields(), "trace");
        assert!(!gate.submit_report());
        assert_eq!(gate.missing(), &["project"]);

        let mut publisher = RecordingPublisher::default();
        for _ in 0..3 {
            match deliver(&gate, &mut publisher, &record(), "trace") {
                Delivery::Local(line) => {
                    assert_eq!(line, r#"Results: {"cold_load_time":[812.0,790.0]}"#)
                }
                other => panic!("unexpected delivery {other:?}"),
            }
        }
        assert!(publisher.submitted.is_empty());
    }

    #[test]
    fn blank_values_count_as_missing() {
        let fields: RequiredFieldSet = [("branch", Some("  ".to_string())), ("host", Some("h".to_string()))]
            .into_iter()
            .collect();
        assert_eq!(fields.missing(), vec!["branch"]);
    }

    #[test]
    fn open_gate_submits_and_reports_rejection() {
        let gate = PublishGate::evaluate(
            &ResultsEnvelope::new(&complete_settings(), complete_build()).required_fields(),
            "trace",
        );
        let mut publisher = RecordingPublisher::default();
        assert!(matches!(deliver(&gate, &mut publisher, &record(), "trace"), Delivery::Published));
        assert_eq!(publisher.submitted[0].test_suite, "cost_control");

        publisher.reject = true;
        match deliver(&gate, &mut publisher, &record(), "trace") {
            Delivery::Failed(PublishError::Rejected { status, .. }) => assert_eq!(status, 500),
            other => panic!("unexpected delivery {other:?}"),
        }
        assert_eq!(publisher.submitted.len(), 2);
    }
}
