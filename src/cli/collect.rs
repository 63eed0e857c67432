//! Collect command implementation

use std::path::Path;
use std::process::ExitCode;

use super::{EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::report::{collect_file, write_collected};

/// Run the collect command
pub fn run_collect(log: &Path, output: Option<&Path>) -> ExitCode {
    let relpaths = match collect_file(log) {
        Ok(relpaths) => relpaths,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    if let Err(e) = write_collected(&relpaths, output) {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    if let Some(output) = output {
        eprintln!("Collected {} failed script(s) into {}", relpaths.len(), output.display());
    }
    ExitCode::from(EXIT_SUCCESS)
}
