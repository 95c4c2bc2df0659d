//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use fleet_config::Config;
use fleet_packages::{
    InMemoryLicenseGate, JsonFileStore, LoadReport, PackageRegistry, RegistryOptions,
    WorkerLauncher, WorkerSettings,
};

use crate::checkers::first_party_catalog;
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when a configuration layer is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Maps configuration onto the supervision policy applied to each worker.
#[must_use]
pub fn worker_settings(config: &Config) -> WorkerSettings {
    WorkerSettings {
        startup_timeout: config.worker_startup_timeout(),
        request_timeout: config.worker_request_timeout(),
        health_interval: config.worker_health_interval(),
        shutdown_grace: config.worker_shutdown_grace(),
        max_restarts: config.worker_max_restarts(),
        restart_base_delay: config.worker_restart_base_delay(),
        auto_restart: config.worker_auto_restart(),
        memory_limit_mb: config.worker_memory_limit_mb(),
        ..WorkerSettings::default()
    }
}

/// A bootstrapped daemon: configuration, telemetry and the package registry.
pub struct Daemon {
    config: Config,
    registry: PackageRegistry,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the package registry.
    #[must_use]
    pub const fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Discovers and loads every package, reporting each outcome.
    pub async fn load_packages(&self) -> LoadReport {
        let report = self.registry.load_all().await;
        self.reporter.packages_loaded(&report);
        report
    }

    /// Stops every worker and loads the package trees again.
    pub async fn reload(&self) -> LoadReport {
        self.reporter.reload_requested();
        let report = self.registry.reload().await;
        self.reporter.packages_loaded(&report);
        report
    }

    /// Stops every worker.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        self.reporter.shutdown_completed();
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// No package is loaded yet; call [`Daemon::load_packages`] from within the
/// runtime that will own the workers.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration or telemetry fails; the
/// reporter sees the failure first.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    launcher: Arc<dyn WorkerLauncher>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let options = RegistryOptions::new(config.builtin_root.clone(), config.external_root.clone())
        .with_worker_settings(worker_settings(&config));
    let registry = PackageRegistry::new(
        options,
        first_party_catalog(),
        Arc::new(JsonFileStore::new(config.store_path.clone())),
        Arc::new(InMemoryLicenseGate::with_perpetual(
            config.licensed_packages().iter().cloned(),
        )),
        launcher,
    );
    reporter.bootstrap_succeeded(&config);

    Ok(Daemon {
        config,
        registry,
        telemetry,
        reporter,
    })
}
