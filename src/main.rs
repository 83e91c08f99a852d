use std::process::ExitCode;

use b2g_perf_lib::app::cli::Cli;
use clap::Parser;

fn main() -> ExitCode {
    b2g_perf_lib::run_b2gperf(Cli::parse())
}
