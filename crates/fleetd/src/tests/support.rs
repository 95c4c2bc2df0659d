//! Doubles shared by the daemon test suites.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use fleet_config::Config;
use fleet_packages::{LoadReport, SkippedPackage};

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::health::HealthReporter;

/// Directory holding the manifests of the first-party packages.
pub fn shipped_builtin_root() -> Utf8PathBuf {
    Utf8PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/packages/builtin"))
}

/// Loader pointing the daemon at the shipped built-ins and a private state
/// directory.
pub struct TestConfigLoader {
    state: TempDir,
    licensed: Vec<String>,
}

impl TestConfigLoader {
    pub fn new() -> Self {
        Self {
            state: TempDir::new().expect("state directory"),
            licensed: Vec::new(),
        }
    }

    pub fn with_license(mut self, package: &str) -> Self {
        self.licensed.push(package.to_owned());
        self
    }

    pub fn external_root(&self) -> PathBuf {
        self.state.path().join("external")
    }

    pub fn store_path(&self) -> PathBuf {
        self.state.path().join("store.json")
    }

    fn utf8(path: PathBuf) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path).expect("temporary paths are UTF-8")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            builtin_root: shipped_builtin_root(),
            external_root: Self::utf8(self.external_root()),
            store_path: Self::utf8(self.store_path()),
            worker_health_interval_secs: 3600,
            licensed_packages: self.licensed.clone(),
            ..Config::default()
        })
    }
}

/// Loader that fails by passing an invalid flag value.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("fleetd"),
            OsString::from("--log-format"),
            OsString::from("pretty"),
        ])
    }
}

/// Lifecycle events captured by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    PackageLoaded(String),
    PackageFailed(String),
    ReloadRequested,
    ShutdownCompleted,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events.lock().expect("reporter mutex poisoned").clone()
    }

    pub fn count(&self, event: &HealthEvent) -> usize {
        self.events().iter().filter(|seen| *seen == event).count()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn package_loaded(&self, name: &str) {
        self.record(HealthEvent::PackageLoaded(name.to_owned()));
    }

    fn package_failed(&self, skipped: &SkippedPackage) {
        self.record(HealthEvent::PackageFailed(skipped.error.to_string()));
    }

    fn reload_requested(&self) {
        self.record(HealthEvent::ReloadRequested);
    }

    fn shutdown_completed(&self) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}

/// Names of the packages a load pass brought up, sorted.
pub fn loaded_names(report: &LoadReport) -> Vec<String> {
    let mut names = report.loaded.clone();
    names.sort();
    names
}
