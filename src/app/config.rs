use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::adb::locator::validate_adb_program;
use crate::app::device::WifiNetwork;
use crate::app::error::ConfigError;
use crate::app::models::{TestRun, TestType};
use crate::app::session::parse_address;

pub const DEFAULT_ADDRESS: &str = "localhost:2828";
pub const DEFAULT_RESULTS_URL: &str = "https://datazilla.mozilla.org";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    pub iterations: usize,
    pub delay_secs: f64,
    pub restart: bool,
    pub reset: bool,
    pub test_type: TestType,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            iterations: 30,
            delay_secs: 1.0,
            restart: true,
            reset: false,
            test_type: TestType::Startup,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingSettings {
    pub script_timeout_secs: f64,
    pub search_timeout_secs: f64,
    pub network_wait_secs: f64,
    pub poll_interval_secs: f64,
    pub start_timeout_secs: f64,
    pub settle_time_secs: f64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            script_timeout_secs: 60.0,
            search_timeout_secs: 10.0,
            network_wait_secs: 30.0,
            poll_interval_secs: 0.5,
            start_timeout_secs: 60.0,
            settle_time_secs: 60.0,
        }
    }
}

impl TimingSettings {
    pub fn script_timeout(&self) -> Duration {
        seconds(self.script_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        seconds(self.search_timeout_secs)
    }

    pub fn network_wait(&self) -> Duration {
        seconds(self.network_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        seconds(self.poll_interval_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        seconds(self.start_timeout_secs)
    }

    pub fn settle_time(&self) -> Duration {
        seconds(self.settle_time_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FpsSettings {
    pub sample_period_ms: u64,
    pub sample_hz: u32,
}

impl Default for FpsSettings {
    fn default() -> Self {
        Self {
            sample_period_ms: 5000,
            sample_hz: 10,
        }
    }
}

impl FpsSettings {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }
}

/// Results-service endpoint and identity. Any missing value turns publishing off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResultsSettings {
    pub url: String,
    pub project: Option<String>,
    pub branch: Option<String>,
    pub key: Option<String>,
    #[serde(skip_serializing)]
    pub secret: Option<String>,
}

impl Default for ResultsSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_RESULTS_URL.to_string(),
            project: None,
            branch: None,
            key: None,
            secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessSettings {
    pub app_names: Vec<String>,
    pub address: String,
    pub device_serial: Option<String>,
    pub adb_path: String,
    pub testvars: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub sources: Option<PathBuf>,
    pub run: RunSettings,
    pub timing: TimingSettings,
    pub fps: FpsSettings,
    pub results: ResultsSettings,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            app_names: Vec::new(),
            address: DEFAULT_ADDRESS.to_string(),
            device_serial: None,
            adb_path: "adb".to_string(),
            testvars: None,
            log_dir: None,
            sources: None,
            run: RunSettings::default(),
            timing: TimingSettings::default(),
            fps: FpsSettings::default(),
            results: ResultsSettings::default(),
        }
    }
}

impl HarnessSettings {
    pub fn delay(&self) -> Duration {
        seconds(self.run.delay_secs)
    }

    pub fn test_run(&self, app_name: &str) -> Result<TestRun, ConfigError> {
        TestRun::new(
            app_name,
            self.run.iterations,
            self.delay(),
            self.run.restart,
            self.run.reset,
        )
    }
}

/// Negative and non-finite values clamp to zero; validation rejects them first.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Rejects configurations that must never reach a device.
pub fn validate_settings(settings: &HarnessSettings) -> Result<(), ConfigError> {
    if settings.app_names.iter().all(|name| name.trim().is_empty()) {
        return Err(ConfigError::NoApps);
    }
    if settings.run.iterations == 0 {
        return Err(ConfigError::ZeroIterations);
    }
    if settings.run.reset && !settings.run.restart {
        return Err(ConfigError::ResetWithoutRestart);
    }
    let durations = [
        ("--delay", settings.run.delay_secs),
        ("--settle-time", settings.timing.settle_time_secs),
        ("--start-timeout", settings.timing.start_timeout_secs),
        ("script_timeout_secs", settings.timing.script_timeout_secs),
        ("search_timeout_secs", settings.timing.search_timeout_secs),
        ("network_wait_secs", settings.timing.network_wait_secs),
        ("poll_interval_secs", settings.timing.poll_interval_secs),
    ];
    for (field, value) in durations {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::InvalidDuration { field, value });
        }
    }
    validate_adb_program(&settings.adb_path).map_err(ConfigError::InvalidAdb)?;
    if parse_address(&settings.address).is_none() {
        return Err(ConfigError::InvalidAddress(settings.address.clone()));
    }
    if let Some(path) = &settings.testvars {
        if !path.is_file() {
            return Err(ConfigError::MissingTestvars(path.display().to_string()));
        }
    }
    Ok(())
}

/// Reads timing overrides from a JSON settings file. A missing file yields
/// the defaults.
pub fn load_settings_from_path(path: &Path) -> Result<HarnessSettings, ConfigError> {
    if !path.exists() {
        return Ok(HarnessSettings::default());
    }
    let invalid = |message: String| ConfigError::InvalidSettings {
        path: path.display().to_string(),
        message,
    };
    let raw = fs::read_to_string(path).map_err(|err| invalid(err.to_string()))?;
    serde_json::from_str(&raw).map_err(|err| invalid(err.to_string()))
}

/// Free-form test variables, e.g. wifi credentials and media seed files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Testvars {
    values: Map<String, Value>,
}

impl Testvars {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(values) => Some(Self { values }),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// `None` when the `wifi` key is absent or lacks an ssid.
    pub fn wifi(&self) -> Option<WifiNetwork> {
        self.values
            .get("wifi")
            .cloned()
            .and_then(|value| serde_json::from_value::<WifiNetwork>(value).ok())
            .filter(|network| !network.ssid.trim().is_empty())
    }

    pub fn carrier(&self) -> bool {
        match self.values.get("carrier") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::String(text)) => !text.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Number(number)) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        }
    }

    /// Local seed file for a media kind (`photo`, `music`, `video`).
    pub fn seed_path(&self, kind: &str) -> Option<PathBuf> {
        self.values
            .get("populate")
            .and_then(|populate| populate.get(kind))
            .and_then(Value::as_str)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
    }
}

pub fn load_testvars(path: &Path) -> Result<Testvars, ConfigError> {
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|_| ConfigError::MissingTestvars(display.clone()))?;
    let value: Value =
        serde_json::from_str(&raw).map_err(|err| ConfigError::InvalidTestvars(format!("{display}: {err}")))?;
    Testvars::from_value(value).ok_or(ConfigError::InvalidTestvars(display))
}
