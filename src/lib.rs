pub mod app;

use std::process::ExitCode;

use tracing::{error, info};
use uuid::Uuid;

use app::adb::device::AdbDevice;
use app::adb::locator::{resolve_adb_program, resolve_serial};
use app::cleanup::best_effort;
use app::cli::{serial_from_env, Cli, GaiaPerfCli, KillAppCli, ListAppsCli};
use app::config::{load_testvars, validate_settings, HarnessSettings, ResultsSettings, Testvars};
use app::device::DeviceController;
use app::error::ConfigError;
use app::harness::Harness;
use app::logging::init_logging;
use app::models::TestRun;
use app::mozperf::{load_results, ParsedApp};
use app::publish::datazilla::{DatazillaPublisher, DEFAULT_SUBMIT_TIMEOUT};
use app::publish::{deliver, Delivery, PublishGate, ResultsEnvelope};
use app::session::gaia::Gaia;
use app::session::marionette::MarionetteClient;
use app::session::{parse_address, SessionError, DEFAULT_MARIONETTE_PORT};
use app::version::discover_build_info;

fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

fn connect(address: &str) -> Result<MarionetteClient, SessionError> {
    let mut client = MarionetteClient::new(address)?;
    client.start_session()?;
    Ok(client)
}

/// A local address reaches the device through an adb port forward.
fn forward_remote_port(device: &mut dyn DeviceController, address: &str, trace_id: &str) {
    let Some((host, port)) = parse_address(address) else {
        return;
    };
    if host == "localhost" || host == "127.0.0.1" {
        best_effort("forward automation port", trace_id, || {
            device.forward_port(port, DEFAULT_MARIONETTE_PORT)
        });
    }
}

/// Everything checked before the device is touched.
fn prepare(cli: Cli) -> Result<(HarnessSettings, Testvars, Vec<TestRun>), ConfigError> {
    let settings = cli.into_settings(serial_from_env())?;
    validate_settings(&settings)?;
    let testvars = match &settings.testvars {
        Some(path) => load_testvars(path)?,
        None => Testvars::default(),
    };
    let runs = settings
        .app_names
        .iter()
        .map(|app_name| settings.test_run(app_name))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((settings, testvars, runs))
}

fn results_gate(
    session: &mut MarionetteClient,
    device: &mut dyn DeviceController,
    results: &ResultsSettings,
    sources: Option<&std::path::Path>,
    trace_id: &str,
) -> (PublishGate, DatazillaPublisher) {
    let build = discover_build_info(&mut Gaia::new(session), device, sources, trace_id);
    let envelope = ResultsEnvelope::new(results, build);
    let gate = PublishGate::evaluate(&envelope.required_fields(), trace_id);
    (gate, DatazillaPublisher::new(envelope, DEFAULT_SUBMIT_TIMEOUT, trace_id))
}

pub fn run_b2gperf(cli: Cli) -> ExitCode {
    init_logging(&cli.common.log_level, cli.common.log_json);
    let trace_id = new_trace_id();

    let (settings, testvars, runs) = match prepare(cli) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let mut device = AdbDevice::new(&settings.adb_path, settings.device_serial.clone(), &trace_id);
    forward_remote_port(&mut device, &settings.address, &trace_id);
    let mut session = match connect(&settings.address) {
        Ok(session) => session,
        Err(err) => {
            error!(trace_id = %trace_id, address = %settings.address, error = %err, "unable to start remote session");
            return ExitCode::FAILURE;
        }
    };

    let (gate, mut publisher) = results_gate(
        &mut session,
        &mut device,
        &settings.results,
        settings.sources.as_deref(),
        &trace_id,
    );

    info!(trace_id = %trace_id, apps = runs.len(), submit_report = gate.submit_report(), "starting");
    let any_failed = Harness::new(
        &settings,
        &testvars,
        &mut session,
        &mut device,
        &gate,
        &mut publisher,
        &trace_id,
    )
    .run_all(&runs);
    session.close();

    if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

pub fn run_listapps(cli: ListAppsCli) -> ExitCode {
    init_logging(&cli.common.log_level, cli.common.log_json);
    let trace_id = new_trace_id();

    let apps = connect(&cli.common.address).and_then(|mut session| Gaia::new(&mut session).list_apps());
    match apps {
        Ok(apps) => {
            let mut names: Vec<String> = apps.iter().flat_map(|app| app.launch_names()).collect();
            names.sort_by_key(|name| name.to_lowercase());
            names.dedup();
            for name in names {
                println!("{name}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(trace_id = %trace_id, error = %err, "unable to list apps");
            ExitCode::FAILURE
        }
    }
}

pub fn run_kill_app(cli: KillAppCli) -> ExitCode {
    init_logging(&cli.common.log_level, cli.common.log_json);
    let trace_id = new_trace_id();

    let killed = connect(&cli.common.address).and_then(|mut session| Gaia::new(&mut session).kill(&cli.origin));
    match killed {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(trace_id = %trace_id, origin = %cli.origin, error = %err, "unable to kill app");
            ExitCode::FAILURE
        }
    }
}

pub fn run_gaiaperf(cli: GaiaPerfCli) -> ExitCode {
    init_logging(&cli.common.log_level, cli.common.log_json);
    let trace_id = new_trace_id();

    let parsed = match load_results(&cli.results_file) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let program = resolve_adb_program("adb");
    let mut device = AdbDevice::new(program, resolve_serial(None, serial_from_env()), &trace_id);
    forward_remote_port(&mut device, &cli.common.address, &trace_id);
    let mut session = match connect(&cli.common.address) {
        Ok(session) => session,
        Err(err) => {
            error!(trace_id = %trace_id, address = %cli.common.address, error = %err, "unable to start remote session");
            return ExitCode::FAILURE;
        }
    };
    let (gate, mut publisher) = results_gate(
        &mut session,
        &mut device,
        &cli.results.settings(),
        cli.results.sources.as_deref(),
        &trace_id,
    );
    session.close();

    let mut any_failed = false;
    for app in parsed {
        let results = match app {
            ParsedApp::NoPasses(app_name) => {
                println!("no passing results for {app_name}, skipping");
                continue;
            }
            ParsedApp::Results(results) => results,
        };
        if !gate.submit_report() {
            println!("results for {}", results.app_name);
        }
        for record in results.records() {
            match deliver(&gate, &mut publisher, &record, &trace_id) {
                Delivery::Published => {}
                Delivery::Failed(_) => any_failed = true,
                Delivery::Local(line) => println!("{} {line}", record.test_suite),
            }
        }
    }

    if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
