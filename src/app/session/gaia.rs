use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use tracing::debug;

use crate::app::session::{Context, ElementRef, RemoteSession, SessionError};

const GAIA_APPS_JS: &str = include_str!("js/gaia_apps.js");
const LAUNCH_APP_JS: &str = include_str!("js/launchapp.js");
const FPS_JS: &str = include_str!("js/fps.js");

/// What the system app reports once a launched app has painted.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRecord {
    pub name: String,
    pub origin: String,
    pub src: Option<String>,
    pub frame: Option<ElementRef>,
    fields: Map<String, Value>,
}

impl LaunchRecord {
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let origin = fields.get("origin").and_then(Value::as_str)?.to_string();
        let name = fields
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let src = fields.get("src").and_then(Value::as_str).map(str::to_string);
        let frame = fields.remove("frame").as_ref().and_then(ElementRef::from_json);
        Some(Self {
            name,
            origin,
            src,
            frame,
            fields,
        })
    }

    /// Numeric field of the launch record, e.g. `cold_load_time`.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstalledApp {
    #[serde(default)]
    pub name: Option<String>,
    pub origin: String,
    #[serde(default)]
    pub entry_points: Vec<String>,
}

impl InstalledApp {
    /// Names accepted by [`Gaia::launch`]; entry points replace the manifest name.
    pub fn launch_names(&self) -> Vec<String> {
        if !self.entry_points.is_empty() {
            return self.entry_points.clone();
        }
        self.name.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FpsReading {
    pub fps: f64,
    pub time_elapsed: f64,
    pub number_frames: f64,
}

/// Helpers for driving the Gaia system app. Every call runs in the content
/// context of the top-level (system) frame unless noted otherwise.
pub struct Gaia<'a> {
    session: &'a mut dyn RemoteSession,
}

impl<'a> Gaia<'a> {
    pub fn new(session: &'a mut dyn RemoteSession) -> Self {
        Self { session }
    }

    pub fn session(&mut self) -> &mut dyn RemoteSession {
        &mut *self.session
    }

    fn system_scope(&mut self) -> Result<(), SessionError> {
        self.session.set_context(Context::Content)?;
        self.session.switch_to_frame(None)
    }

    fn run(&mut self, body: &str, args: Vec<Value>) -> Result<Value, SessionError> {
        self.system_scope()?;
        self.session.execute(&format!("{GAIA_APPS_JS}\n{body}"), args)
    }

    fn run_async(&mut self, body: &str, args: Vec<Value>) -> Result<Value, SessionError> {
        self.system_scope()?;
        self.session.execute_async(
            &format!("{GAIA_APPS_JS}\nlet finished = arguments[arguments.length - 1];\n{body}"),
            args,
        )
    }

    pub fn unlock(&mut self) -> Result<bool, SessionError> {
        Ok(truthy(&self.run_async("GaiaHarness.unlock(finished);", Vec::new())?))
    }

    /// Kills every running app except the homescreen. Returns how many were
    /// asked to close.
    pub fn kill_all(&mut self) -> Result<u64, SessionError> {
        let killed = self.run("return GaiaHarness.killAll();", Vec::new())?;
        Ok(killed.as_u64().unwrap_or(0))
    }

    pub fn kill(&mut self, origin: &str) -> Result<(), SessionError> {
        self.run(
            "GaiaHarness.kill(arguments[0]); return true;",
            vec![Value::String(origin.to_string())],
        )?;
        Ok(())
    }

    pub fn go_home(&mut self) -> Result<(), SessionError> {
        self.run("return GaiaHarness.goHome();", Vec::new())?;
        Ok(())
    }

    /// Launches `app_name` and waits for its load-time event. `None` means the
    /// app is unknown or already displayed.
    pub fn launch(&mut self, app_name: &str) -> Result<Option<LaunchRecord>, SessionError> {
        let body = format!("{LAUNCH_APP_JS}\nlaunch_app(arguments[0], finished);");
        let value = self.run_async(&body, vec![Value::String(app_name.to_string())])?;
        debug!(app = %app_name, result = %value, "launch result");
        Ok(LaunchRecord::from_value(value))
    }

    pub fn list_apps(&mut self) -> Result<Vec<InstalledApp>, SessionError> {
        let value = self.run_async("GaiaHarness.listApps(finished);", Vec::new())?;
        serde_json::from_value(value)
            .map_err(|err| SessionError::Protocol(format!("unexpected app list: {err}")))
    }

    /// Starts the frame counter in the currently selected frame.
    pub fn start_fps(&mut self, sample_hz: u32) -> Result<bool, SessionError> {
        let value = self.session.execute_async(
            &format!(
                "{FPS_JS}\nlet finished = arguments[arguments.length - 1];\nFpsMeter.start(arguments[0], finished);"
            ),
            vec![Value::from(sample_hz.max(1))],
        )?;
        Ok(truthy(&value))
    }

    /// Stops the frame counter in the currently selected frame. `None` when
    /// nothing was sampled.
    pub fn stop_fps(&mut self) -> Result<Option<FpsReading>, SessionError> {
        let value = self
            .session
            .execute(&format!("{FPS_JS}\nreturn FpsMeter.stop();"), Vec::new())?;
        if !value.is_object() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| SessionError::Protocol(format!("unexpected fps reading: {err}")))
    }

    pub fn setting(&mut self, name: &str) -> Result<Value, SessionError> {
        self.run_async(
            "GaiaHarness.getSetting(arguments[0], finished);",
            vec![Value::String(name.to_string())],
        )
    }

    pub fn wifi_mac_address(&mut self) -> Result<Option<String>, SessionError> {
        let value = self.run("return GaiaHarness.macAddress();", Vec::new())?;
        Ok(value
            .as_str()
            .map(str::trim)
            .filter(|mac| !mac.is_empty())
            .map(str::to_string))
    }

    pub fn insert_contact(&mut self, given_name: &str, family_name: &str, tel: &str) -> Result<bool, SessionError> {
        let contact = serde_json::json!({
            "givenName": [given_name],
            "familyName": [family_name],
            "name": [format!("{given_name} {family_name}")],
            "tel": [{ "type": ["mobile"], "value": tel }],
        });
        Ok(truthy(
            &self.run_async("GaiaHarness.insertContact(arguments[0], finished);", vec![contact])?,
        ))
    }

    /// Switches into the frame hosting a launched app.
    pub fn enter_app(&mut self, record: &LaunchRecord) -> Result<(), SessionError> {
        self.system_scope()?;
        match &record.frame {
            Some(frame) => self.session.switch_to_frame(Some(frame)),
            None => Err(SessionError::NoSuchElement(format!(
                "frame for {}",
                record.origin
            ))),
        }
    }

    pub fn set_script_timeout(&mut self, timeout: Duration) -> Result<(), SessionError> {
        self.session.set_script_timeout(timeout)
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::FakeSession;

    #[test]
    fn launch_parses_record_and_frame() {
        let mut session = FakeSession::new().respond(|script, args| {
            assert!(script.contains("launch_app(arguments[0], finished)"));
            assert_eq!(args[0], Value::String("Clock".to_string()));
            Ok(serde_json::json!({
                "name": "Clock",
                "origin": "app://clock.gaiamobile.org",
                "src": "app://clock.gaiamobile.org/index.html",
                "cold_load_time": 812,
                "frame": { crate::app::session::ELEMENT_KEY: "frame-1" },
            }))
        });
        let record = Gaia::new(&mut session)
            .launch("Clock")
            .expect("launch")
            .expect("record");
        assert_eq!(record.origin, "app://clock.gaiamobile.org");
        assert_eq!(record.metric("cold_load_time"), Some(812.0));
        assert_eq!(record.metric("warm_load_time"), None);
        assert_eq!(record.frame, Some(ElementRef("frame-1".to_string())));
        assert_eq!(session.contexts, vec![Context::Content]);
    }

    #[test]
    fn launch_without_record_is_none() {
        let mut session = FakeSession::new().respond(|_, _| Ok(Value::Bool(false)));
        assert!(Gaia::new(&mut session).launch("Nope").expect("launch").is_none());
    }

    #[test]
    fn list_apps_prefers_entry_points() {
        let mut session = FakeSession::new().respond(|_, _| {
            Ok(serde_json::json!([
                { "name": "Clock", "origin": "app://clock.gaiamobile.org" },
                { "name": "Communications", "origin": "app://communications.gaiamobile.org",
                  "entry_points": ["Phone", "Contacts"] },
            ]))
        });
        let apps = Gaia::new(&mut session).list_apps().expect("apps");
        let names: Vec<String> = apps.iter().flat_map(InstalledApp::launch_names).collect();
        assert_eq!(names, vec!["Clock", "Phone", "Contacts"]);
    }

    #[test]
    fn stop_fps_without_samples_is_none() {
        let mut session = FakeSession::new().respond(|_, _| Ok(Value::Bool(false)));
        assert_eq!(Gaia::new(&mut session).stop_fps().expect("stop"), None);
    }

    #[test]
    fn stop_fps_parses_reading() {
        let mut session = FakeSession::new().respond(|_, _| {
            Ok(serde_json::json!({ "fps": 58.5, "time_elapsed": 5000.0, "number_frames": 292, "samples": 50 }))
        });
        let reading = Gaia::new(&mut session).stop_fps().expect("stop").expect("reading");
        assert_eq!(reading.fps, 58.5);
        assert_eq!(reading.number_frames, 292.0);
    }

    #[test]
    fn blank_mac_address_is_absent() {
        let mut session = FakeSession::new().respond(|_, _| Ok(Value::String("  ".to_string())));
        assert_eq!(Gaia::new(&mut session).wifi_mac_address().expect("mac"), None);
    }

    #[test]
    fn enter_app_requires_frame() {
        let mut session = FakeSession::new();
        let record = LaunchRecord::from_value(serde_json::json!({ "origin": "app://x" })).expect("record");
        let err = Gaia::new(&mut session).enter_app(&record).expect_err("no frame");
        assert!(matches!(err, SessionError::NoSuchElement(_)));
    }

    #[test]
    fn truthiness_follows_script_results() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&serde_json::json!(0)));
        assert!(truthy(&serde_json::json!(1)));
        assert!(truthy(&serde_json::json!({})));
        assert!(!truthy(&serde_json::json!("")));
    }
}
