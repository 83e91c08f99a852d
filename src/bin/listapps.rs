use std::process::ExitCode;

use b2g_perf_lib::app::cli::ListAppsCli;
use clap::Parser;

fn main() -> ExitCode {
    b2g_perf_lib::run_listapps(ListAppsCli::parse())
}
