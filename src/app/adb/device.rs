use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::app::adb::parse::{has_connected_interface, parse_ls, parse_wpa_network_id, ps_has_process};
use crate::app::adb::paths::{device_parent_dir, validate_device_path};
use crate::app::adb::runner::{run_command_with_timeout, CommandOutput, DEFAULT_COMMAND_TIMEOUT};
use crate::app::device::{DeviceController, WifiNetwork};
use crate::app::error::AppError;
use crate::app::wait::{Wait, WaitError};

const WIFI_INTERFACE: &str = "wlan0";
const START_POLL: Duration = Duration::from_secs(1);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

/// Device controller that shells out to `adb`.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    program: String,
    serial: Option<String>,
    trace_id: String,
}

impl AdbDevice {
    pub fn new(program: impl Into<String>, serial: Option<String>, trace_id: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            serial,
            trace_id: trace_id.into(),
        }
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    fn base_args(&self) -> Vec<String> {
        match &self.serial {
            Some(serial) => vec!["-s".to_string(), serial.clone()],
            None => Vec::new(),
        }
    }

    fn adb(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, AppError> {
        let mut full = self.base_args();
        full.extend(args.iter().map(|arg| arg.to_string()));
        run_command_with_timeout(&self.program, &full, timeout, &self.trace_id)
    }

    fn adb_checked(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, AppError> {
        let what = format!("adb {}", args.join(" "));
        self.adb(args, timeout)?.ensure_success(&what, &self.trace_id)
    }

    /// Runs a device shell command and returns its stdout.
    pub fn shell(&self, command: &[&str]) -> Result<String, AppError> {
        let mut args = vec!["shell"];
        args.extend_from_slice(command);
        Ok(self.adb_checked(&args, DEFAULT_COMMAND_TIMEOUT)?.stdout)
    }

    fn b2g_running(&self) -> Result<bool, AppError> {
        Ok(ps_has_process(&self.shell(&["ps"])?, "b2g"))
    }

    fn wpa_cli(&self, args: &[&str]) -> Result<String, AppError> {
        let interface = format!("-i{WIFI_INTERFACE}");
        let mut command = vec!["wpa_cli", interface.as_str()];
        command.extend_from_slice(args);
        let output = self.shell(&command)?;
        if output.lines().any(|line| line.trim() == "FAIL") {
            return Err(AppError::dependency(
                format!("wpa_cli {} failed", args.join(" ")),
                &self.trace_id,
            ));
        }
        Ok(output)
    }
}

/// Wraps a value in the double quotes `wpa_cli` expects, single-quoted for
/// the device shell.
fn wpa_quote(value: &str) -> String {
    format!("'\"{}\"'", value.replace('\'', "'\\''"))
}

impl DeviceController for AdbDevice {
    fn stop(&mut self) -> Result<(), AppError> {
        info!(trace_id = %self.trace_id, "stopping b2g");
        self.shell(&["stop", "b2g"])?;
        Ok(())
    }

    fn start(&mut self, timeout: Duration) -> Result<(), AppError> {
        info!(trace_id = %self.trace_id, timeout_secs = timeout.as_secs(), "starting b2g");
        self.shell(&["start", "b2g"])?;
        Wait::new(timeout)
            .poll_interval(START_POLL)
            .ignoring(AppError::is_timeout)
            .until("b2g did not start", || {
                Ok(self.b2g_running()?.then_some(()))
            })
            .map_err(|err| match err {
                WaitError::Aborted(err) => err,
                expired @ WaitError::Timeout { .. } => AppError::timeout(expired.to_string(), &self.trace_id),
            })
    }

    fn is_online(&mut self) -> Result<bool, AppError> {
        Ok(has_connected_interface(&self.shell(&["netcfg"])?))
    }

    fn connect_wifi(&mut self, network: &WifiNetwork) -> Result<(), AppError> {
        info!(trace_id = %self.trace_id, ssid = %network.ssid, "connecting to wifi");
        self.shell(&["svc", "wifi", "enable"])?;
        let id = parse_wpa_network_id(&self.wpa_cli(&["add_network"])?).ok_or_else(|| {
            AppError::dependency("wpa_cli did not return a network id", &self.trace_id)
        })?;
        let id = id.to_string();
        self.wpa_cli(&["set_network", &id, "ssid", &wpa_quote(&network.ssid)])?;
        match &network.psk {
            Some(psk) => {
                let key_mgmt = network.key_management.as_deref().unwrap_or("WPA-PSK");
                self.wpa_cli(&["set_network", &id, "key_mgmt", key_mgmt])?;
                self.wpa_cli(&["set_network", &id, "psk", &wpa_quote(psk)])?;
            }
            None => {
                self.wpa_cli(&["set_network", &id, "key_mgmt", "NONE"])?;
            }
        }
        self.wpa_cli(&["select_network", &id])?;
        self.wpa_cli(&["enable_network", &id])?;
        Ok(())
    }

    fn connect_cell_data(&mut self) -> Result<(), AppError> {
        info!(trace_id = %self.trace_id, "enabling cell data");
        self.shell(&["svc", "data", "enable"])?;
        Ok(())
    }

    fn remove_path(&mut self, path: &str) -> Result<(), AppError> {
        validate_device_path(path).map_err(|message| AppError::validation(message, &self.trace_id))?;
        debug!(trace_id = %self.trace_id, path = %path, "removing device path");
        let output = self.adb(&["shell", "rm", "-r", path.trim()], DEFAULT_COMMAND_TIMEOUT)?;
        let text = format!("{}{}", output.stdout, output.stderr);
        if text.contains("No such file or directory") {
            return Ok(());
        }
        output.ensure_success(&format!("rm -r {path}"), &self.trace_id)?;
        Ok(())
    }

    fn list_items(&mut self, path: &str) -> Result<Vec<String>, AppError> {
        let output = self.adb(&["shell", "ls", path], DEFAULT_COMMAND_TIMEOUT)?;
        Ok(parse_ls(&output.stdout))
    }

    fn push_file(&mut self, local: &Path, remote: &str) -> Result<(), AppError> {
        validate_device_path(remote).map_err(|message| AppError::validation(message, &self.trace_id))?;
        self.make_dirs(&device_parent_dir(remote))?;
        let local = local.to_string_lossy();
        self.adb_checked(&["push", &*local, remote], TRANSFER_TIMEOUT)?;
        Ok(())
    }

    fn pull_file(&mut self, remote: &str, local: &Path) -> Result<(), AppError> {
        let local = local.to_string_lossy();
        self.adb_checked(&["pull", remote, &*local], TRANSFER_TIMEOUT)?;
        Ok(())
    }

    fn cat_file(&mut self, remote: &str) -> Result<String, AppError> {
        self.shell(&["cat", remote])
    }

    fn copy_on_device(&mut self, from: &str, to: &str) -> Result<(), AppError> {
        let input = format!("if={from}");
        let output = format!("of={to}");
        self.adb_checked(&["shell", "dd", input.as_str(), output.as_str()], TRANSFER_TIMEOUT)?;
        Ok(())
    }

    fn make_dirs(&mut self, path: &str) -> Result<(), AppError> {
        if path == "/" {
            return Ok(());
        }
        self.shell(&["mkdir", "-p", path])?;
        Ok(())
    }

    fn forward_port(&mut self, local: u16, remote: u16) -> Result<(), AppError> {
        let local = format!("tcp:{local}");
        let remote = format!("tcp:{remote}");
        self.adb_checked(&["forward", local.as_str(), remote.as_str()], DEFAULT_COMMAND_TIMEOUT)?;
        Ok(())
    }

    fn dump_log(&mut self) -> Result<String, AppError> {
        self.shell(&["logcat", "-d"])
    }
}
