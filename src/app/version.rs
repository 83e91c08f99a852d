//! Build identity reported alongside results: revisions, OS version, build id
//! and a machine name. Every lookup is best effort; a failure leaves the field
//! empty and the publish gate takes it from there.

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::app::adb::paths::{SETTINGS_APP_ZIPS, SOURCES_XML_PATH};
use crate::app::device::DeviceController;
use crate::app::error::AppError;
use crate::app::session::gaia::Gaia;

pub const GAIA_COMMIT_ENTRY: &str = "resources/gaia_commit.txt";
pub const UNKNOWN_MACHINE: &str = "unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub gaia_revision: Option<String>,
    pub gecko_revision: Option<String>,
    pub build_revision: Option<String>,
    pub os_version: Option<String>,
    pub build_id: Option<String>,
    pub machine_name: Option<String>,
}

impl BuildInfo {
    pub fn machine_name(&self) -> &str {
        self.machine_name.as_deref().unwrap_or(UNKNOWN_MACHINE)
    }

    /// Revision fields merged into the submitted build record.
    pub fn revisions(&self) -> Vec<(&'static str, &str)> {
        [
            ("gaia_revision", &self.gaia_revision),
            ("gecko_revision", &self.gecko_revision),
            ("build_revision", &self.build_revision),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|value| (name, value)))
        .collect()
    }
}

/// First line of the gaia commit file inside a settings app package.
pub fn gaia_revision_from_zip(path: &Path) -> Result<Option<String>, String> {
    let file = File::open(path).map_err(|err| format!("Failed to open {}: {err}", path.display()))?;
    let mut archive = ZipArchive::new(file).map_err(|err| format!("Invalid package: {err}"))?;
    let mut entry = archive
        .by_name(GAIA_COMMIT_ENTRY)
        .map_err(|err| format!("Missing {GAIA_COMMIT_ENTRY}: {err}"))?;
    let mut contents = String::new();
    entry
        .read_to_string(&mut contents)
        .map_err(|err| format!("Failed to read {GAIA_COMMIT_ENTRY}: {err}"))?;
    Ok(contents
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string))
}

/// Gecko and build revisions from a repo manifest, in that order.
pub fn manifest_revisions(sources_xml: &str) -> (Option<String>, Option<String>) {
    let project_re = Regex::new(r"<project\b[^>]*>").ok();
    let attr_re = Regex::new(r#"([A-Za-z_][\w.-]*)\s*=\s*"([^"]*)""#).ok();
    let (Some(project_re), Some(attr_re)) = (project_re, attr_re) else {
        return (None, None);
    };

    let mut gecko = None;
    let mut build = None;
    for tag in project_re.find_iter(sources_xml) {
        let mut path = None;
        let mut revision = None;
        for caps in attr_re.captures_iter(tag.as_str()) {
            match &caps[1] {
                "path" => path = Some(caps[2].to_string()),
                "revision" => revision = Some(caps[2].to_string()),
                _ => {}
            }
        }
        let revision = revision.filter(|value| !value.is_empty());
        match path.as_deref() {
            Some("gecko") => gecko = revision,
            Some("build") => build = revision,
            _ => {}
        }
    }
    (gecko, build)
}

fn setting_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn pull_gaia_revision(device: &mut dyn DeviceController) -> Result<Option<String>, String> {
    let temp_dir = TempDir::new().map_err(|err| format!("Failed to create temp dir: {err}"))?;
    let local = temp_dir.path().join("application.zip");
    let mut last_error = String::from("no settings package found");
    for remote in SETTINGS_APP_ZIPS {
        match device.pull_file(remote, &local) {
            Ok(()) if local.is_file() => return gaia_revision_from_zip(&local),
            Ok(()) => last_error = format!("{remote} was not pulled"),
            Err(err) => last_error = err.to_string(),
        }
    }
    Err(last_error)
}

fn read_manifest(device: &mut dyn DeviceController, sources: Option<&Path>) -> Result<String, String> {
    match sources {
        Some(path) => fs::read_to_string(path).map_err(|err| format!("Failed to read {}: {err}", path.display())),
        None => device.cat_file(SOURCES_XML_PATH).map_err(|err: AppError| err.to_string()),
    }
}

/// Collects the identity of the build under test from the running instance and
/// the device filesystem. `sources` replaces the on-device manifest.
pub fn discover_build_info(
    gaia: &mut Gaia<'_>,
    device: &mut dyn DeviceController,
    sources: Option<&Path>,
    trace_id: &str,
) -> BuildInfo {
    let mut info = BuildInfo::default();

    match gaia.setting("deviceinfo.os") {
        Ok(value) => info.os_version = setting_string(&value),
        Err(err) => warn!(trace_id = %trace_id, error = %err, "unable to read deviceinfo.os"),
    }
    match gaia.setting("deviceinfo.platform_build_id") {
        Ok(value) => info.build_id = setting_string(&value),
        Err(err) => warn!(trace_id = %trace_id, error = %err, "unable to read build id"),
    }
    match gaia.wifi_mac_address() {
        Ok(mac) => info.machine_name = mac.filter(|mac| !mac.trim().is_empty()),
        Err(err) => warn!(trace_id = %trace_id, error = %err, "unable to read mac address"),
    }

    match pull_gaia_revision(device) {
        Ok(revision) => info.gaia_revision = revision,
        Err(err) => warn!(trace_id = %trace_id, error = %err, "unable to read gaia revision"),
    }

    match read_manifest(device, sources) {
        Ok(xml) => {
            let (gecko, build) = manifest_revisions(&xml);
            info.gecko_revision = gecko;
            info.build_revision = build;
        }
        Err(err) => warn!(trace_id = %trace_id, error = %err, "unable to read sources.xml"),
    }

    debug!(trace_id = %trace_id, build = ?info, "build info");
    info
}
