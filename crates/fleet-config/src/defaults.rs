//! Built-in configuration defaults.
//!
//! Every key the daemon reads has a constant here; the `default_*` functions
//! feed the configuration derive and [`crate::Config::default`].

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";
/// Directory scanned for packages shipped with the host.
pub const DEFAULT_BUILTIN_ROOT: &str = "/usr/share/fleet/packages";
/// Directory scanned for separately installed packages.
pub const DEFAULT_EXTERNAL_ROOT: &str = "/var/lib/fleet/packages";
/// File backing the package metadata store.
pub const DEFAULT_STORE_PATH: &str = "/var/lib/fleet/package-store.json";
/// Address-space ceiling for worker processes, in MiB. Zero disables it.
pub const DEFAULT_WORKER_MEMORY_LIMIT_MB: u64 = 512;
/// Seconds a worker gets to print its readiness line.
pub const DEFAULT_WORKER_STARTUP_TIMEOUT_SECS: u64 = 10;
/// Seconds a single worker request may take.
pub const DEFAULT_WORKER_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Seconds between worker health checks.
pub const DEFAULT_WORKER_HEALTH_INTERVAL_SECS: u64 = 30;
/// Automatic restarts before a crashing worker is abandoned.
pub const DEFAULT_WORKER_MAX_RESTARTS: u32 = 3;
/// Restart backoff unit in milliseconds.
pub const DEFAULT_WORKER_RESTART_BASE_DELAY_MS: u64 = 1000;
/// Seconds a worker gets to exit after a shutdown request.
pub const DEFAULT_WORKER_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default built-in package root.
#[must_use]
pub fn default_builtin_root() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_BUILTIN_ROOT)
}

/// Default external package root.
#[must_use]
pub fn default_external_root() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_EXTERNAL_ROOT)
}

/// Default metadata store location.
#[must_use]
pub fn default_store_path() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_STORE_PATH)
}
