use std::process::ExitCode;

use b2g_perf_lib::app::cli::KillAppCli;
use clap::Parser;

fn main() -> ExitCode {
    b2g_perf_lib::run_kill_app(KillAppCli::parse())
}
