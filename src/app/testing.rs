//! In-memory stand-ins for the device, the remote session, probes and the
//! results service.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::time::Duration;

use crate::app::device::{DeviceController, WifiNetwork};
use crate::app::error::{AppError, ProbeError};
use crate::app::models::{Metrics, ReportRecord};
use crate::app::probe::MetricCollector;
use crate::app::publish::{PublishError, ReportPublisher};
use crate::app::session::{Context, ElementRef, Locator, PointerStep, RemoteSession, SessionError};

type Responder = Box<dyn FnMut(&str, &[Value]) -> Result<Value, SessionError>>;

/// Remote session whose script results come from a closure.
pub struct FakeSession {
    pub scripts: Vec<String>,
    pub contexts: Vec<Context>,
    pub frames: Vec<Option<ElementRef>>,
    pub actions: Vec<Vec<PointerStep>>,
    pub script_timeouts: Vec<Duration>,
    pub restarts: usize,
    pub missing_elements: bool,
    pub fail_actions: bool,
    responder: Responder,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            scripts: Vec::new(),
            contexts: Vec::new(),
            frames: Vec::new(),
            actions: Vec::new(),
            script_timeouts: Vec::new(),
            restarts: 0,
            missing_elements: false,
            fail_actions: false,
            responder: Box::new(|_, _| Ok(Value::Bool(true))),
        }
    }

    pub fn respond(mut self, responder: impl FnMut(&str, &[Value]) -> Result<Value, SessionError> + 'static) -> Self {
        self.responder = Box::new(responder);
        self
    }

    fn answer(&mut self, script: &str, args: Vec<Value>) -> Result<Value, SessionError> {
        self.scripts.push(script.to_string());
        (self.responder)(script, &args)
    }
}

impl RemoteSession for FakeSession {
    fn execute(&mut self, script: &str, args: Vec<Value>) -> Result<Value, SessionError> {
        self.answer(script, args)
    }

    fn execute_async(&mut self, script: &str, args: Vec<Value>) -> Result<Value, SessionError> {
        self.answer(script, args)
    }

    fn set_context(&mut self, context: Context) -> Result<(), SessionError> {
        self.contexts.push(context);
        Ok(())
    }

    fn switch_to_frame(&mut self, frame: Option<&ElementRef>) -> Result<(), SessionError> {
        self.frames.push(frame.cloned());
        Ok(())
    }

    fn set_script_timeout(&mut self, timeout: Duration) -> Result<(), SessionError> {
        self.script_timeouts.push(timeout);
        Ok(())
    }

    fn set_search_timeout(&mut self, _timeout: Duration) -> Result<(), SessionError> {
        Ok(())
    }

    fn find_element(&mut self, locator: Locator<'_>) -> Result<ElementRef, SessionError> {
        if self.missing_elements {
            return Err(SessionError::NoSuchElement(locator.selector()));
        }
        Ok(ElementRef(locator.selector()))
    }

    fn perform_touch_actions(&mut self, steps: &[PointerStep]) -> Result<(), SessionError> {
        if self.fail_actions {
            return Err(SessionError::Script {
                status: "unknown error".to_string(),
                message: "touch actions rejected".to_string(),
            });
        }
        self.actions.push(steps.to_vec());
        Ok(())
    }

    fn restart(&mut self, _timeout: Duration) -> Result<(), SessionError> {
        self.restarts += 1;
        Ok(())
    }
}

/// Device that records every call as a short command line.
#[derive(Debug, Default)]
pub struct FakeDevice {
    pub calls: Vec<String>,
    /// Answers for successive `is_online` calls; the last one repeats.
    pub online: VecDeque<bool>,
    pub log: String,
    pub fail_start: bool,
    listings: HashMap<String, Vec<String>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listing(&mut self, path: &str, items: &[&str]) {
        self.listings
            .insert(path.to_string(), items.iter().map(|item| item.to_string()).collect());
    }

    pub fn online_sequence(mut self, states: &[bool]) -> Self {
        self.online = states.iter().copied().collect();
        self
    }
}

impl DeviceController for FakeDevice {
    fn stop(&mut self) -> Result<(), AppError> {
        self.calls.push("stop".to_string());
        Ok(())
    }

    fn start(&mut self, _timeout: Duration) -> Result<(), AppError> {
        self.calls.push("start".to_string());
        if self.fail_start {
            return Err(AppError::timeout("b2g did not start", "fake"));
        }
        Ok(())
    }

    fn is_online(&mut self) -> Result<bool, AppError> {
        self.calls.push("netcfg".to_string());
        let state = if self.online.len() > 1 {
            self.online.pop_front().unwrap_or(false)
        } else {
            self.online.front().copied().unwrap_or(false)
        };
        Ok(state)
    }

    fn connect_wifi(&mut self, network: &WifiNetwork) -> Result<(), AppError> {
        self.calls.push(format!("wifi {}", network.ssid));
        Ok(())
    }

    fn connect_cell_data(&mut self) -> Result<(), AppError> {
        self.calls.push("data".to_string());
        Ok(())
    }

    fn remove_path(&mut self, path: &str) -> Result<(), AppError> {
        self.calls.push(format!("rm {path}"));
        Ok(())
    }

    fn list_items(&mut self, path: &str) -> Result<Vec<String>, AppError> {
        self.calls.push(format!("ls {path}"));
        Ok(self.listings.get(path).cloned().unwrap_or_default())
    }

    fn push_file(&mut self, local: &Path, remote: &str) -> Result<(), AppError> {
        self.calls.push(format!("push {} {remote}", local.display()));
        Ok(())
    }

    fn pull_file(&mut self, remote: &str, local: &Path) -> Result<(), AppError> {
        self.calls.push(format!("pull {remote} {}", local.display()));
        Ok(())
    }

    fn cat_file(&mut self, remote: &str) -> Result<String, AppError> {
        self.calls.push(format!("cat {remote}"));
        Ok(String::new())
    }

    fn copy_on_device(&mut self, from: &str, to: &str) -> Result<(), AppError> {
        self.calls.push(format!("dd {from} {to}"));
        Ok(())
    }

    fn make_dirs(&mut self, path: &str) -> Result<(), AppError> {
        self.calls.push(format!("mkdir {path}"));
        Ok(())
    }

    fn forward_port(&mut self, local: u16, remote: u16) -> Result<(), AppError> {
        self.calls.push(format!("forward {local} {remote}"));
        Ok(())
    }

    fn dump_log(&mut self) -> Result<String, AppError> {
        self.calls.push("logcat".to_string());
        Ok(self.log.clone())
    }
}

/// Probe that replays a fixed script of outcomes, indexed by attempt.
pub struct ScriptedCollector {
    pub required: Vec<String>,
    pub requires_connection: bool,
    pub connection_checks: usize,
    pub collected: usize,
    pub cleanups: usize,
    pub fail_cleanup: bool,
    pub offline: bool,
    outcome: Box<dyn FnMut(usize) -> Result<Metrics, ProbeError>>,
}

impl ScriptedCollector {
    pub fn new(
        required: &[&str],
        outcome: impl FnMut(usize) -> Result<Metrics, ProbeError> + 'static,
    ) -> Self {
        Self {
            required: required.iter().map(|metric| metric.to_string()).collect(),
            requires_connection: false,
            connection_checks: 0,
            collected: 0,
            cleanups: 0,
            fail_cleanup: false,
            offline: false,
            outcome: Box::new(outcome),
        }
    }

    /// Always succeeds with the same metrics.
    pub fn constant(metrics: &[(&str, f64)]) -> Self {
        let metrics: Metrics = metrics
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();
        let required = metrics.keys().cloned().collect();
        let mut collector = Self::new(&[], move |_| Ok(metrics.clone()));
        collector.required = required;
        collector
    }
}

impl MetricCollector for ScriptedCollector {
    fn required_metrics(&self) -> Vec<String> {
        self.required.clone()
    }

    fn requires_connection(&self) -> bool {
        self.requires_connection
    }

    fn ensure_connection(&mut self) -> Result<(), ProbeError> {
        self.connection_checks += 1;
        if self.offline {
            return Err(ProbeError::NetworkConnection("offline".to_string()));
        }
        Ok(())
    }

    fn collect(&mut self, attempt: usize) -> Result<Metrics, ProbeError> {
        self.collected += 1;
        (self.outcome)(attempt)
    }

    fn cleanup(&mut self) -> Result<(), ProbeError> {
        self.cleanups += 1;
        if self.fail_cleanup {
            return Err(ProbeError::Timeout("kill_all".to_string()));
        }
        Ok(())
    }
}

pub fn launch_metrics(cold_load_time: f64) -> Metrics {
    Metrics::from([("cold_load_time".to_string(), cold_load_time)])
}

/// Publisher that remembers every record it was handed.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub submitted: Vec<ReportRecord>,
    pub reject: bool,
}

impl ReportPublisher for RecordingPublisher {
    fn submit(&mut self, record: &ReportRecord) -> Result<(), PublishError> {
        self.submitted.push(record.clone());
        if self.reject {
            return Err(PublishError::Rejected {
                status: 500,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}
