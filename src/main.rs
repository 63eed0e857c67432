//! exrun - run example scripts concurrently and report failures

use std::process::ExitCode;

use exrun::cli;

fn main() -> ExitCode {
    cli::run()
}
