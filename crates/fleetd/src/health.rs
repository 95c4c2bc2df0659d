//! Lifecycle events surfaced to the log sink.
//!
//! Worker-level events (ready, crash, restart) are logged by the supervisor
//! in `fleet_packages::worker`; this reporter covers the daemon around it.

use std::sync::Arc;

use fleet_config::Config;
use fleet_packages::{LoadReport, SkippedPackage};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer for daemon lifecycle milestones.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked for every package that finished loading.
    fn package_loaded(&self, name: &str);

    /// Invoked for every package directory that was skipped.
    fn package_failed(&self, skipped: &SkippedPackage);

    /// Invoked when a reload is requested.
    fn reload_requested(&self);

    /// Invoked once every package has been stopped.
    fn shutdown_completed(&self);

    /// Reports each entry of a load pass.
    fn packages_loaded(&self, report: &LoadReport) {
        for name in &report.loaded {
            self.package_loaded(name);
        }
        for skipped in &report.skipped {
            self.package_failed(skipped);
        }
    }
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn package_loaded(&self, name: &str) {
        (**self).package_loaded(name);
    }

    fn package_failed(&self, skipped: &SkippedPackage) {
        (**self).package_failed(skipped);
    }

    fn reload_requested(&self) {
        (**self).reload_requested();
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            builtin_root = %config.builtin_root(),
            external_root = %config.external_root(),
            store = %config.store_path(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn package_loaded(&self, name: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "package_loaded",
            package = name,
            "package loaded"
        );
    }

    fn package_failed(&self, skipped: &SkippedPackage) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "package_failed",
            path = %skipped.path.display(),
            error = %skipped.error,
            "package skipped"
        );
    }

    fn reload_requested(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "reload_requested",
            "reloading packages"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            "all packages stopped"
        );
    }
}
