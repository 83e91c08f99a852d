use std::process::ExitCode;

use b2g_perf_lib::app::cli::GaiaPerfCli;
use clap::Parser;

fn main() -> ExitCode {
    b2g_perf_lib::run_gaiaperf(GaiaPerfCli::parse())
}
