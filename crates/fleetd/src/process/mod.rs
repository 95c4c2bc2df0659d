//! Process-level lifecycle: runtime construction and signal handling.

mod launch;
mod signals;


pub use launch::{LaunchError, run_daemon, serve};
pub use signals::{DaemonSignal, SignalSource, SystemSignals};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
