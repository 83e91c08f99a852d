use std::time::Duration;

use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use oauth1_request as oauth;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::app::models::ReportRecord;
use crate::app::publish::{PublishError, ReportPublisher, ResultsEnvelope};

pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

const OS_NAME: &str = "Firefox OS";
const PLATFORM: &str = "Gonk";
const BUILD_NAME: &str = "B2G";
const BUILD_VERSION: &str = "prerelease";

/// Form fields of one submission. Both are covered by the OAuth signature.
#[derive(oauth::Request)]
struct LoadTestForm<'a> {
    data: &'a str,
    user: &'a str,
}

/// Signed submission ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedForm {
    pub authorization: String,
    pub body: String,
}

/// Posts one dataset per run to a Datazilla instance, signed with two-legged
/// OAuth 1.0 (HMAC-SHA1, consumer credentials only).
#[derive(Debug, Clone)]
pub struct DatazillaPublisher {
    envelope: ResultsEnvelope,
    timeout: Duration,
    trace_id: String,
}

impl DatazillaPublisher {
    pub fn new(envelope: ResultsEnvelope, timeout: Duration, trace_id: impl Into<String>) -> Self {
        Self {
            envelope,
            timeout,
            trace_id: trace_id.into(),
        }
    }

    pub fn endpoint(&self) -> Result<String, PublishError> {
        let base = self
            .envelope
            .base_url()
            .ok_or_else(|| PublishError::Encode("results url has no scheme or host".to_string()))?;
        let project = self.envelope.project.as_deref().unwrap_or_default();
        Ok(format!("{base}/{project}/api/load_test"))
    }

    pub fn dataset(&self, record: &ReportRecord, date: i64) -> Value {
        let build = &self.envelope.build;

        let mut test_build = Map::new();
        test_build.insert("name".to_string(), json!(BUILD_NAME));
        test_build.insert("version".to_string(), json!(BUILD_VERSION));
        test_build.insert("revision".to_string(), json!(build.gaia_revision));
        test_build.insert("branch".to_string(), json!(self.envelope.branch));
        test_build.insert("id".to_string(), json!(build.build_id));
        for (name, revision) in build.revisions() {
            test_build.insert(name.to_string(), json!(revision));
        }

        json!({
            "test_machine": {
                "name": build.machine_name(),
                "os": OS_NAME,
                "osversion": build.os_version,
                "platform": PLATFORM,
            },
            "test_build": test_build,
            "testrun": {
                "date": date,
                "suite": record.test_suite,
            },
            "results": record.series,
        })
    }

    /// Form-encodes `data=<dataset json>&user=<project>` and signs it for a
    /// POST to `url`.
    pub fn sign(&self, url: &str, data: &str) -> Result<SignedForm, PublishError> {
        let (Some(key), Some(secret)) = (self.envelope.key.as_deref(), self.envelope.secret.as_deref()) else {
            return Err(PublishError::Encode("oauth key and secret are required".to_string()));
        };
        let form = LoadTestForm {
            data,
            user: self.envelope.project.as_deref().unwrap_or_default(),
        };
        let authorization = oauth::Builder::<_, _>::new(oauth::Credentials::new(key, secret), oauth::HmacSha1::new())
            .post(url, &form);
        Ok(SignedForm {
            authorization,
            body: oauth::to_form(&form),
        })
    }

    async fn post(&self, url: &str, signed: SignedForm) -> Result<(), PublishError> {
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client: Client<_, Full<Bytes>> = Client::builder(TokioExecutor::new()).build(https);

        let request = Request::builder()
            .method("POST")
            .uri(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("User-Agent", concat!("b2gperf/", env!("CARGO_PKG_VERSION")))
            .header("Authorization", signed.authorization)
            .body(Full::new(Bytes::from(signed.body)))
            .map_err(|err| PublishError::Encode(err.to_string()))?;

        debug!(trace_id = %self.trace_id, url = %url, "posting results");
        let response = tokio::time::timeout(self.timeout, client.request(request))
            .await
            .map_err(|_| PublishError::Transport(format!("no response within {:?}", self.timeout)))?
            .map_err(|err| PublishError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = match response.into_body().collect().await {
            Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
            Err(_) => status
                .canonical_reason()
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR.as_str())
                .to_string(),
        };
        Err(PublishError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

impl ReportPublisher for DatazillaPublisher {
    fn submit(&mut self, record: &ReportRecord) -> Result<(), PublishError> {
        let url = self.endpoint()?;
        let dataset = self.dataset(record, chrono::Utc::now().timestamp());
        let data = serde_json::to_string(&dataset).map_err(|err| PublishError::Encode(err.to_string()))?;
        let signed = self.sign(&url, &data)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| PublishError::Transport(format!("Failed to start http runtime: {err}")))?;
        runtime.block_on(self.post(&url, signed))
    }
}
