use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::app::error::AppError;

/// Wifi credentials as given under the `wifi` key of the testvars file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiNetwork {
    pub ssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,
    #[serde(default, rename = "keyManagement", skip_serializing_if = "Option::is_none")]
    pub key_management: Option<String>,
}

/// Lifecycle and filesystem access for the device under test. Only used
/// during setup, teardown and network gating.
pub trait DeviceController {
    fn stop(&mut self) -> Result<(), AppError>;

    /// Starts the runtime and waits up to `timeout` for it to come up.
    fn start(&mut self, timeout: Duration) -> Result<(), AppError>;

    fn is_online(&mut self) -> Result<bool, AppError>;

    fn connect_wifi(&mut self, network: &WifiNetwork) -> Result<(), AppError>;

    fn connect_cell_data(&mut self) -> Result<(), AppError>;

    fn remove_path(&mut self, path: &str) -> Result<(), AppError>;

    fn list_items(&mut self, path: &str) -> Result<Vec<String>, AppError>;

    fn push_file(&mut self, local: &Path, remote: &str) -> Result<(), AppError>;

    fn pull_file(&mut self, remote: &str, local: &Path) -> Result<(), AppError>;

    fn cat_file(&mut self, remote: &str) -> Result<String, AppError>;

    fn copy_on_device(&mut self, from: &str, to: &str) -> Result<(), AppError>;

    fn make_dirs(&mut self, path: &str) -> Result<(), AppError>;

    fn forward_port(&mut self, local: u16, remote: u16) -> Result<(), AppError>;

    fn dump_log(&mut self) -> Result<String, AppError>;
}
