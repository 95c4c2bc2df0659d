//! Entry point for the fleet package daemon.

use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match fleetd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Telemetry may not be installed yet, so write the cause directly.
            let mut stderr = io::stderr().lock();
            drop(writeln!(stderr, "fleetd: {error}"));
            ExitCode::FAILURE
        }
    }
}
