pub mod apps;
pub mod gestures;
pub mod launch;
pub mod populate;
pub mod scroll;

use crate::app::config::{HarnessSettings, Testvars};
use crate::app::device::DeviceController;
use crate::app::error::ProbeError;
use crate::app::models::{Metrics, TestType};
use crate::app::network::ensure_connection;
use crate::app::probe::apps::AppProfile;
use crate::app::probe::launch::{launch_once, LAUNCH_METRICS};
use crate::app::probe::scroll::{scroll_once, ScrollTarget, SCROLL_METRICS};
use crate::app::session::gaia::Gaia;
use crate::app::session::RemoteSession;

/// One measurable operation, run once per attempt.
pub trait MetricCollector {
    /// Metrics every successful attempt must report with a non-zero value.
    fn required_metrics(&self) -> Vec<String>;

    fn requires_connection(&self) -> bool {
        false
    }

    fn ensure_connection(&mut self) -> Result<(), ProbeError> {
        Ok(())
    }

    fn collect(&mut self, attempt: usize) -> Result<Metrics, ProbeError>;

    /// Returns the device to a clean state between attempts.
    fn cleanup(&mut self) -> Result<(), ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Launch,
    Scroll(ScrollTarget),
}

impl Probe {
    pub fn new(test_type: TestType, profile: &AppProfile) -> Self {
        match test_type {
            TestType::Startup => Probe::Launch,
            TestType::ScrollFps => Probe::Scroll(ScrollTarget {
                locator: profile.scroll_locator,
                gesture: profile.gesture,
            }),
        }
    }

    pub fn required_metrics(&self) -> &'static [&'static str] {
        match self {
            Probe::Launch => &LAUNCH_METRICS,
            Probe::Scroll(_) => &SCROLL_METRICS,
        }
    }
}

/// A probe bound to a live session and device for one app's run.
pub struct ProbeSession<'a> {
    app_name: &'a str,
    probe: Probe,
    profile: AppProfile,
    session: &'a mut dyn RemoteSession,
    device: &'a mut dyn DeviceController,
    testvars: &'a Testvars,
    settings: &'a HarnessSettings,
    trace_id: &'a str,
}

impl<'a> ProbeSession<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app_name: &'a str,
        probe: Probe,
        profile: AppProfile,
        session: &'a mut dyn RemoteSession,
        device: &'a mut dyn DeviceController,
        testvars: &'a Testvars,
        settings: &'a HarnessSettings,
        trace_id: &'a str,
    ) -> Self {
        Self {
            app_name,
            probe,
            profile,
            session,
            device,
            testvars,
            settings,
            trace_id,
        }
    }
}

impl MetricCollector for ProbeSession<'_> {
    fn required_metrics(&self) -> Vec<String> {
        self.probe
            .required_metrics()
            .iter()
            .map(|metric| metric.to_string())
            .collect()
    }

    fn requires_connection(&self) -> bool {
        self.profile.requires_connection
    }

    fn ensure_connection(&mut self) -> Result<(), ProbeError> {
        ensure_connection(&mut *self.device, self.testvars, &self.settings.timing, self.trace_id)
    }

    fn collect(&mut self, _attempt: usize) -> Result<Metrics, ProbeError> {
        let mut gaia = Gaia::new(&mut *self.session);
        match &self.probe {
            Probe::Launch => launch_once(&mut gaia, self.app_name),
            Probe::Scroll(target) => scroll_once(
                &mut gaia,
                self.app_name,
                target,
                &self.settings.fps,
                self.settings.timing.search_timeout(),
                self.settings.timing.poll_interval(),
                self.trace_id,
            ),
        }
    }

    fn cleanup(&mut self) -> Result<(), ProbeError> {
        Gaia::new(&mut *self.session).kill_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::probe::apps::profile_for;
    use crate::app::testing::{FakeDevice, FakeSession};
    use serde_json::json;

    #[test]
    fn probe_kind_follows_test_type() {
        let profile = profile_for("Contacts");
        assert_eq!(Probe::new(TestType::Startup, &profile), Probe::Launch);
        match Probe::new(TestType::ScrollFps, &profile) {
            Probe::Scroll(target) => assert_eq!(target.locator, "#groups-container"),
            other => panic!("unexpected probe {other:?}"),
        }
        assert_eq!(Probe::Launch.required_metrics(), &["cold_load_time"]);
    }

    #[test]
    fn bound_probe_launches_and_cleans_up() {
        let mut session = FakeSession::new().respond(|script, _| {
            if script.contains("launch_app(") {
                return Ok(json!({ "origin": "app://clock.gaiamobile.org", "cold_load_time": 640 }));
            }
            if script.contains("GaiaHarness.killAll()") {
                return Ok(json!(2));
            }
            Ok(json!(true))
        });
        let mut device = FakeDevice::new();
        let testvars = Testvars::default();
        let settings = HarnessSettings::default();
        let profile = profile_for("Clock");
        let mut probe = ProbeSession::new(
            "Clock",
            Probe::new(TestType::Startup, &profile),
            profile,
            &mut session,
            &mut device,
            &testvars,
            &settings,
            "trace",
        );
        assert!(!probe.requires_connection());
        assert_eq!(probe.required_metrics(), vec!["cold_load_time"]);
        let metrics = probe.collect(0).expect("metrics");
        assert_eq!(metrics.get("cold_load_time"), Some(&640.0));
        probe.cleanup().expect("cleanup");
        assert!(session.scripts.last().map(|s| s.contains("killAll")).unwrap_or(false));
    }
}
