//! Sample external package worker: a memory-pressure checker.

use std::io::{self, BufRead, BufReader, Write};
use std::process::ExitCode;

use fleet_worker_sdk::sample::{MemoryPressure, SampleOptions};
use fleet_worker_sdk::serve;

fn main() -> ExitCode {
    // stdout carries the protocol; diagnostics go to stderr for the host.
    drop(
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_ansi(false)
            .compact()
            .try_init(),
    );

    let options = SampleOptions::from_env();
    let mut input = BufReader::new(io::stdin().lock());
    if options.silent {
        // Hold the pipes open without ever announcing readiness.
        let mut sink = String::new();
        while input.read_line(&mut sink).is_ok_and(|read| read > 0) {
            sink.clear();
        }
        return ExitCode::SUCCESS;
    }

    let mut output = io::stdout().lock();
    match serve(&mut input, &mut output, &mut MemoryPressure::new(options)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            drop(writeln!(io::stderr().lock(), "fleet-sample-worker: {error}"));
            ExitCode::FAILURE
        }
    }
}
