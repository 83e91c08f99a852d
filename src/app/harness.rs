//! Drives each app through `Setup -> Running -> Aggregating | Aborted ->
//! Teardown`. One app's failure never stops the next one; the caller only sees
//! whether any app failed.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::app::adb::paths::RESET_PATHS;
use crate::app::aggregate::{summarize, summary_lines};
use crate::app::cleanup::best_effort;
use crate::app::config::{HarnessSettings, Testvars};
use crate::app::device::DeviceController;
use crate::app::error::{ProbeError, RunError};
use crate::app::models::{ReportRecord, TestRun};
use crate::app::probe::apps::{profile_for, AppProfile};
use crate::app::probe::populate::populate;
use crate::app::probe::{Probe, ProbeSession};
use crate::app::publish::{deliver, local_report, Delivery, PublishGate, ReportPublisher};
use crate::app::runner::{RunOutcome, TestRunner};
use crate::app::session::gaia::Gaia;
use crate::app::session::RemoteSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Running,
    Aggregating,
    Aborted,
    Teardown,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Running => "running",
            Phase::Aggregating => "aggregating",
            Phase::Aborted => "aborted",
            Phase::Teardown => "teardown",
            Phase::Done => "done",
        }
    }
}

#[derive(Debug)]
pub enum AppVerdict {
    Completed { outcome: RunOutcome, delivery: Delivery },
    Failed(RunError),
}

/// What happened to one app, plus the lines meant for stdout.
#[derive(Debug)]
pub struct AppReport {
    pub app_name: String,
    pub phases: Vec<Phase>,
    pub verdict: AppVerdict,
    pub output: Vec<String>,
    pub log_dump: Option<PathBuf>,
}

impl AppReport {
    pub fn failed(&self) -> bool {
        matches!(self.verdict, AppVerdict::Failed(_))
    }
}

pub struct Harness<'a> {
    settings: &'a HarnessSettings,
    testvars: &'a Testvars,
    session: &'a mut dyn RemoteSession,
    device: &'a mut dyn DeviceController,
    gate: &'a PublishGate,
    publisher: &'a mut dyn ReportPublisher,
    trace_id: &'a str,
    settled: bool,
}

impl<'a> Harness<'a> {
    pub fn new(
        settings: &'a HarnessSettings,
        testvars: &'a Testvars,
        session: &'a mut dyn RemoteSession,
        device: &'a mut dyn DeviceController,
        gate: &'a PublishGate,
        publisher: &'a mut dyn ReportPublisher,
        trace_id: &'a str,
    ) -> Self {
        Self {
            settings,
            testvars,
            session,
            device,
            gate,
            publisher,
            trace_id,
            settled: false,
        }
    }

    /// Runs every app in order, printing as it goes. Returns true when any
    /// app failed.
    pub fn run_all(&mut self, runs: &[TestRun]) -> bool {
        let mut any_failed = false;
        for run in runs {
            let report = self.run_app(run);
            for line in &report.output {
                println!("{line}");
            }
            any_failed |= report.failed();
        }
        any_failed
    }

    pub fn run_app(&mut self, run: &TestRun) -> AppReport {
        let profile = profile_for(&run.app_name);
        let mut phases = Vec::new();
        let mut output = Vec::new();
        let mut log_dump = None;

        self.advance(run, &mut phases, Phase::Setup);
        let verdict = match self.execute(run, profile, &mut phases, &mut output) {
            Ok(verdict) => verdict,
            Err(err) => {
                self.advance(run, &mut phases, Phase::Aborted);
                error!(trace_id = %self.trace_id, app = %run.app_name, error = %err, "run failed");
                log_dump = self.dump_log(run);
                AppVerdict::Failed(err)
            }
        };

        self.advance(run, &mut phases, Phase::Teardown);
        self.teardown();
        self.advance(run, &mut phases, Phase::Done);

        AppReport {
            app_name: run.app_name.clone(),
            phases,
            verdict,
            output,
            log_dump,
        }
    }

    fn execute(
        &mut self,
        run: &TestRun,
        profile: AppProfile,
        phases: &mut Vec<Phase>,
        output: &mut Vec<String>,
    ) -> Result<AppVerdict, RunError> {
        self.setup(run, &profile).map_err(|source| RunError::Setup {
            app: run.app_name.clone(),
            source,
        })?;

        self.advance(run, phases, Phase::Running);
        let outcome = self.measure(run, profile)?;

        self.advance(run, phases, Phase::Aggregating);
        let delivery = self.report(run, &outcome, output)?;
        Ok(AppVerdict::Completed { outcome, delivery })
    }

    fn advance(&self, run: &TestRun, phases: &mut Vec<Phase>, phase: Phase) {
        info!(trace_id = %self.trace_id, app = %run.app_name, phase = phase.as_str(), "phase");
        phases.push(phase);
    }

    fn settle(&self) {
        let settle = self.settings.timing.settle_time();
        if !settle.is_zero() {
            info!(trace_id = %self.trace_id, seconds = settle.as_secs_f64(), "waiting for the device to settle");
            std::thread::sleep(settle);
        }
    }

    fn restart(&mut self, run: &TestRun) -> Result<(), ProbeError> {
        self.device.stop()?;
        if run.reset_policy {
            for path in RESET_PATHS {
                self.device.remove_path(path)?;
            }
        }
        self.device.start(self.settings.timing.start_timeout())?;
        self.session.restart(self.settings.timing.start_timeout())?;
        Ok(())
    }

    fn setup(&mut self, run: &TestRun, profile: &AppProfile) -> Result<(), ProbeError> {
        if run.restart_policy {
            self.restart(run)?;
            self.settle();
        } else if !self.settled {
            self.settle();
        }
        self.settled = true;

        let mut gaia = Gaia::new(&mut *self.session);
        gaia.set_script_timeout(self.settings.timing.script_timeout())?;
        if !gaia.unlock()? {
            warn!(trace_id = %self.trace_id, app = %run.app_name, "lockscreen did not report unlocked");
        }
        gaia.kill_all()?;
        gaia.go_home()?;
        if let Some(step) = profile.populate {
            populate(step, &mut gaia, &mut *self.device, self.testvars, self.trace_id)?;
        }
        Ok(())
    }

    fn measure(&mut self, run: &TestRun, profile: AppProfile) -> Result<RunOutcome, RunError> {
        let probe = Probe::new(self.settings.run.test_type, &profile);
        let mut collector = ProbeSession::new(
            &run.app_name,
            probe,
            profile,
            &mut *self.session,
            &mut *self.device,
            self.testvars,
            self.settings,
            self.trace_id,
        );
        TestRunner::new(self.trace_id).run(run, &mut collector)
    }

    fn report(&mut self, run: &TestRun, outcome: &RunOutcome, output: &mut Vec<String>) -> Result<Delivery, RunError> {
        let summaries = summarize(&outcome.series)?;
        output.extend(summary_lines(&run.app_name, &summaries));

        let record = ReportRecord::new(&run.app_name, outcome.series.clone());
        let delivery = deliver(self.gate, &mut *self.publisher, &record, self.trace_id);
        match &delivery {
            Delivery::Local(line) => output.push(line.clone()),
            Delivery::Failed(_) => output.push(local_report(&record)),
            Delivery::Published => {}
        }
        Ok(delivery)
    }

    fn dump_log(&mut self, run: &TestRun) -> Option<PathBuf> {
        let dir = self.settings.log_dir.as_deref()?;
        let path = log_dump_path(dir, &run.suite_name(), &chrono::Local::now().format("%Y%m%d%H%M%S").to_string());
        let device = &mut *self.device;
        let written = best_effort("dump device log", self.trace_id, || {
            let log = device.dump_log().map_err(|err| err.to_string())?;
            fs::create_dir_all(dir).map_err(|err| format!("Failed to create {}: {err}", dir.display()))?;
            fs::write(&path, log).map_err(|err| format!("Failed to write {}: {err}", path.display()))
        });
        if written {
            info!(trace_id = %self.trace_id, path = %path.display(), "device log saved");
            Some(path)
        } else {
            None
        }
    }

    fn teardown(&mut self) {
        let session = &mut *self.session;
        best_effort("kill running apps", self.trace_id, || {
            Gaia::new(session).kill_all().map(|_| ())
        });
    }
}

pub fn log_dump_path(dir: &Path, suite: &str, timestamp: &str) -> PathBuf {
    dir.join(format!("{suite}_{timestamp}.log"))
}
