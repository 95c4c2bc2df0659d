//! Runs the daemon until it is told to stop.

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use fleet_packages::ProcessLauncher;

use crate::bootstrap::{BootstrapError, Daemon, SystemConfigLoader, bootstrap_with};
use crate::health::StructuredHealthReporter;

use super::PROCESS_TARGET;
use super::signals::{DaemonSignal, SignalSource, SystemSignals};

/// Errors that stop the daemon from running.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrap failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The async runtime could not be built.
    #[error("failed to build runtime: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Runs the daemon using the production collaborators.
///
/// Workers are children of a single-threaded runtime; every package call and
/// every supervisor task is polled on the main thread.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, runtime construction or signal
/// installation fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    let daemon = bootstrap_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        Arc::new(ProcessLauncher),
    )?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| LaunchError::Runtime { source })?;

    runtime.block_on(async {
        let signals = SystemSignals::install().map_err(|source| LaunchError::Signals { source })?;
        serve(&daemon, signals).await;
        Ok(())
    })
}

/// Loads every package, then reloads or stops as `signals` dictates.
///
/// Returns after the registry has shut down, either on request or because
/// the signal source closed.
pub async fn serve<S>(daemon: &Daemon, mut signals: S)
where
    S: SignalSource,
{
    let report = daemon.load_packages().await;
    info!(
        target: PROCESS_TARGET,
        loaded = report.loaded.len(),
        skipped = report.skipped.len(),
        "daemon ready"
    );

    while let Some(DaemonSignal::Reload) = signals.recv().await {
        let reloaded = daemon.reload().await;
        info!(
            target: PROCESS_TARGET,
            loaded = reloaded.loaded.len(),
            skipped = reloaded.skipped.len(),
            "reload completed"
        );
    }

    info!(target: PROCESS_TARGET, "shutting down");
    daemon.shutdown().await;
}
