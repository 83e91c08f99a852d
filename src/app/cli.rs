use clap::{Args, Parser};
use std::path::PathBuf;

use crate::app::adb::locator::{resolve_adb_program, resolve_serial, SERIAL_ENV};
use crate::app::config::{
    load_settings_from_path, HarnessSettings, ResultsSettings, DEFAULT_ADDRESS, DEFAULT_RESULTS_URL,
};
use crate::app::error::ConfigError;
use crate::app::models::TestType;

/// Remote address and logging options shared by every tool.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Address of the remote automation server (host:port)
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    pub address: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

/// Results service credentials and location.
#[derive(Args, Debug, Clone)]
pub struct ResultsArgs {
    /// Base URL of the results service
    #[arg(long = "dz-url", default_value = DEFAULT_RESULTS_URL)]
    pub url: String,

    /// Results service project
    #[arg(long = "dz-project")]
    pub project: Option<String>,

    /// Results service branch
    #[arg(long = "dz-branch")]
    pub branch: Option<String>,

    /// Results service key
    #[arg(long = "dz-key")]
    pub key: Option<String>,

    /// Results service secret
    #[arg(long = "dz-secret", env = "DATAZILLA_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Local sources.xml used for gecko/build revisions instead of the device copy
    #[arg(long)]
    pub sources: Option<PathBuf>,
}

impl ResultsArgs {
    pub fn settings(&self) -> ResultsSettings {
        ResultsSettings {
            url: self.url.clone(),
            project: self.project.clone(),
            branch: self.branch.clone(),
            key: self.key.clone(),
            secret: self.secret.clone(),
        }
    }
}

/// Measure launch time or scrolling performance of Gaia apps.
#[derive(Parser, Debug, Clone)]
#[command(name = "b2gperf", version, about, long_about = None)]
pub struct Cli {
    /// Names of the apps to test
    #[arg(required = true, value_name = "APP_NAME")]
    pub app_names: Vec<String>,

    /// Seconds to wait before each attempt
    #[arg(long, default_value_t = 1.0)]
    pub delay: f64,

    /// Number of successful iterations to collect
    #[arg(long, default_value_t = 30)]
    pub iterations: usize,

    /// Do not restart B2G before each app
    #[arg(long)]
    pub no_restart: bool,

    /// Wipe persistent storage before restarting B2G
    #[arg(long)]
    pub reset: bool,

    /// Seconds to wait after a restart before measuring
    #[arg(long, default_value_t = 60.0)]
    pub settle_time: f64,

    /// Seconds to wait for B2G to start
    #[arg(long, default_value_t = 60.0)]
    pub start_timeout: f64,

    /// Kind of measurement
    #[arg(long, value_enum, default_value_t = TestType::Startup)]
    pub test_type: TestType,

    /// Serial of the device to use (defaults to $ANDROID_SERIAL)
    #[arg(long)]
    pub device_serial: Option<String>,

    /// adb executable
    #[arg(long, default_value = "adb")]
    pub adb_path: String,

    /// JSON file of test variables (wifi, carrier, populate)
    #[arg(long)]
    pub testvars: Option<PathBuf>,

    /// Directory that receives the device log when a run aborts
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// JSON file overriding timing and sampling constants
    #[arg(long)]
    pub settings: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub results: ResultsArgs,
}

impl Cli {
    /// Builds harness settings: file defaults first, then flags.
    pub fn into_settings(self, serial_from_env: Option<String>) -> Result<HarnessSettings, ConfigError> {
        let mut settings = match &self.settings {
            Some(path) => load_settings_from_path(path)?,
            None => HarnessSettings::default(),
        };
        settings.app_names = self.app_names;
        settings.address = self.common.address;
        settings.device_serial = resolve_serial(self.device_serial.as_deref(), serial_from_env);
        settings.adb_path = resolve_adb_program(&self.adb_path);
        settings.testvars = self.testvars;
        settings.log_dir = self.log_dir;
        settings.sources = self.results.sources.clone();
        settings.run.iterations = self.iterations;
        settings.run.delay_secs = self.delay;
        settings.run.restart = !self.no_restart;
        settings.run.reset = self.reset;
        settings.run.test_type = self.test_type;
        settings.timing.settle_time_secs = self.settle_time;
        settings.timing.start_timeout_secs = self.start_timeout;
        settings.results = self.results.settings();
        Ok(settings)
    }
}

pub fn serial_from_env() -> Option<String> {
    std::env::var(SERIAL_ENV).ok()
}

/// List the apps installed on the device.
#[derive(Parser, Debug, Clone)]
#[command(name = "listapps", version, about, long_about = None)]
pub struct ListAppsCli {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Kill a running app.
#[derive(Parser, Debug, Clone)]
#[command(name = "kill_app", version, about, long_about = None)]
pub struct KillAppCli {
    /// Origin of the app to kill, e.g. app://clock.gaiamobile.org
    pub origin: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Publish results produced by the in-app perf framework.
#[derive(Parser, Debug, Clone)]
#[command(name = "gaiaperf", version, about, long_about = None)]
pub struct GaiaPerfCli {
    /// JSON results file
    pub results_file: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub results: ResultsArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
        ListAppsCli::command().debug_assert();
        KillAppCli::command().debug_assert();
        GaiaPerfCli::command().debug_assert();
    }

    #[test]
    fn flags_map_onto_settings() {
        let cli = Cli::try_parse_from([
            "b2gperf",
            "--iterations",
            "10",
            "--delay",
            "0.5",
            "--no-restart",
            "--test-type",
            "scrollfps",
            "--dz-project",
            "b2g",
            "--address",
            "10.0.0.5:2829",
            "Contacts",
            "Gallery",
        ])
        .expect("parse");
        let settings = cli.into_settings(Some("emulator-5554".to_string())).expect("settings");
        assert_eq!(settings.app_names, vec!["Contacts", "Gallery"]);
        assert_eq!(settings.run.iterations, 10);
        assert_eq!(settings.run.delay_secs, 0.5);
        assert!(!settings.run.restart);
        assert_eq!(settings.run.test_type, TestType::ScrollFps);
        assert_eq!(settings.results.project.as_deref(), Some("b2g"));
        assert_eq!(settings.results.branch, None);
        assert_eq!(settings.address, "10.0.0.5:2829");
        assert_eq!(settings.device_serial.as_deref(), Some("emulator-5554"));
    }

    #[test]
    fn app_name_is_required() {
        assert!(Cli::try_parse_from(["b2gperf"]).is_err());
    }

    #[test]
    fn rejects_unknown_test_type() {
        assert!(Cli::try_parse_from(["b2gperf", "--test-type", "memory", "Clock"]).is_err());
    }
}
