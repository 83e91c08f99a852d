use tracing::{info, warn};

use crate::app::config::{Testvars, TimingSettings};
use crate::app::device::DeviceController;
use crate::app::error::{AppError, ProbeError};
use crate::app::wait::{Wait, WaitError};

/// Makes sure the device has a data path before a network-bound attempt:
/// wifi from testvars first, then cell data when a carrier is configured.
pub fn ensure_connection(
    device: &mut dyn DeviceController,
    testvars: &Testvars,
    timing: &TimingSettings,
    trace_id: &str,
) -> Result<(), ProbeError> {
    if device.is_online()? {
        return Ok(());
    }

    if let Some(network) = testvars.wifi() {
        let connected = device
            .connect_wifi(&network)
            .map_err(ProbeError::from)
            .and_then(|()| wait_online(device, timing));
        match connected {
            Ok(()) => {
                info!(trace_id = %trace_id, ssid = %network.ssid, "connected to wifi");
                return Ok(());
            }
            Err(err) => warn!(trace_id = %trace_id, error = %err, "wifi connection failed"),
        }
    }

    if testvars.carrier() {
        device.connect_cell_data()?;
        wait_online(device, timing)?;
        info!(trace_id = %trace_id, "connected to cell data");
        return Ok(());
    }

    Err(ProbeError::NetworkConnection(
        "device is offline and no usable wifi or carrier is configured".to_string(),
    ))
}

fn wait_online(device: &mut dyn DeviceController, timing: &TimingSettings) -> Result<(), ProbeError> {
    Wait::new(timing.network_wait())
        .poll_interval(timing.poll_interval())
        .ignoring(AppError::is_timeout)
        .until("device did not come online", || Ok(device.is_online()?.then_some(())))
        .map_err(|err| match err {
            WaitError::Aborted(err) => ProbeError::Device(err),
            expired @ WaitError::Timeout { .. } => ProbeError::NetworkConnection(expired.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::FakeDevice;
    use serde_json::json;

    fn quick_timing() -> TimingSettings {
        TimingSettings {
            network_wait_secs: 0.05,
            poll_interval_secs: 0.01,
            ..TimingSettings::default()
        }
    }

    fn testvars(value: serde_json::Value) -> Testvars {
        Testvars::from_value(value).expect("object")
    }

    #[test]
    fn online_device_needs_nothing() {
        let mut device = FakeDevice::new().online_sequence(&[true]);
        ensure_connection(&mut device, &Testvars::default(), &quick_timing(), "trace").expect("online");
        assert_eq!(device.calls, vec!["netcfg"]);
    }

    #[test]
    fn connects_wifi_from_testvars() {
        let mut device = FakeDevice::new().online_sequence(&[false, true]);
        let vars = testvars(json!({ "wifi": { "ssid": "perf-lab" } }));
        ensure_connection(&mut device, &vars, &quick_timing(), "trace").expect("wifi");
        assert_eq!(device.calls, vec!["netcfg", "wifi perf-lab", "netcfg"]);
    }

    #[test]
    fn falls_back_to_cell_data() {
        let mut device = FakeDevice::new().online_sequence(&[false, false, true]);
        let vars = testvars(json!({ "carrier": true }));
        ensure_connection(&mut device, &vars, &quick_timing(), "trace").expect("data");
        assert!(device.calls.contains(&"data".to_string()));
        assert!(!device.calls.iter().any(|call| call.starts_with("wifi")));
    }

    #[test]
    fn offline_without_options_is_a_network_error() {
        let mut device = FakeDevice::new().online_sequence(&[false]);
        let err = ensure_connection(&mut device, &Testvars::default(), &quick_timing(), "trace")
            .expect_err("offline");
        assert_eq!(err.kind(), "network_connection");
    }

    #[test]
    fn wifi_that_never_comes_up_is_a_network_error() {
        let mut device = FakeDevice::new().online_sequence(&[false]);
        let vars = testvars(json!({ "wifi": { "ssid": "perf-lab" } }));
        let err = ensure_connection(&mut device, &vars, &quick_timing(), "trace").expect_err("offline");
        assert_eq!(err.kind(), "network_connection");
    }
}
