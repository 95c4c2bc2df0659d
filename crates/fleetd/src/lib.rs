//! The fleet package daemon.
//!
//! `fleetd` resolves its configuration through [`fleet_config`], installs a
//! structured `tracing` subscriber and builds a
//! [`PackageRegistry`](fleet_packages::PackageRegistry) wired to the
//! first-party checkers, a JSON metadata store and the process launcher.
//! [`run_daemon`] then loads every package and reacts to signals: `SIGHUP`
//! reloads, `SIGINT` and `SIGTERM` stop every worker and exit.
//!
//! Lifecycle milestones are surfaced through a [`HealthReporter`] so that
//! operators can follow bootstrap and package loading in the log sink.

mod bootstrap;
pub mod checkers;
mod health;
mod process;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
    worker_settings,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{DaemonSignal, LaunchError, SignalSource, SystemSignals, run_daemon, serve};
pub use telemetry::{TelemetryError, TelemetryHandle};
