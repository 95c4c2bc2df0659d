//! Layered configuration for the fleet package daemon.
//!
//! Values resolve from built-in defaults, then a TOML configuration file
//! (`--config-path` or `FLEET_CONFIG_PATH`), then `FLEET_*` environment
//! variables, then command-line flags. Later layers win.
//!
//! Worker timings are stored as plain integers so that every layer can set
//! them; the accessors convert them into [`Duration`]s for the supervisor.

mod defaults;
mod logging;


use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BUILTIN_ROOT, DEFAULT_EXTERNAL_ROOT, DEFAULT_LOG_FILTER, DEFAULT_STORE_PATH,
    DEFAULT_WORKER_HEALTH_INTERVAL_SECS, DEFAULT_WORKER_MAX_RESTARTS,
    DEFAULT_WORKER_MEMORY_LIMIT_MB, DEFAULT_WORKER_REQUEST_TIMEOUT_SECS,
    DEFAULT_WORKER_RESTART_BASE_DELAY_MS, DEFAULT_WORKER_SHUTDOWN_GRACE_SECS,
    DEFAULT_WORKER_STARTUP_TIMEOUT_SECS, default_builtin_root, default_external_root,
    default_log_filter, default_log_filter_string, default_log_format, default_store_path,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "FLEET")]
pub struct Config {
    /// `tracing` filter directive, for example `info,fleet_packages=debug`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Directory holding packages shipped with the host.
    #[ortho_config(default = default_builtin_root())]
    pub builtin_root: Utf8PathBuf,
    /// Directory holding separately installed packages.
    #[ortho_config(default = default_external_root())]
    pub external_root: Utf8PathBuf,
    /// JSON file backing the package metadata store.
    #[ortho_config(default = default_store_path())]
    pub store_path: Utf8PathBuf,
    /// Address-space ceiling for worker processes in MiB; `0` disables it.
    #[ortho_config(default = DEFAULT_WORKER_MEMORY_LIMIT_MB)]
    pub worker_memory_limit_mb: u64,
    /// Seconds a worker gets to signal readiness.
    #[ortho_config(default = DEFAULT_WORKER_STARTUP_TIMEOUT_SECS)]
    pub worker_startup_timeout_secs: u64,
    /// Seconds a single worker request may take.
    #[ortho_config(default = DEFAULT_WORKER_REQUEST_TIMEOUT_SECS)]
    pub worker_request_timeout_secs: u64,
    /// Seconds between health checks.
    #[ortho_config(default = DEFAULT_WORKER_HEALTH_INTERVAL_SECS)]
    pub worker_health_interval_secs: u64,
    /// Automatic restarts allowed per worker.
    #[ortho_config(default = DEFAULT_WORKER_MAX_RESTARTS)]
    pub worker_max_restarts: u32,
    /// Restart backoff unit in milliseconds.
    #[ortho_config(default = DEFAULT_WORKER_RESTART_BASE_DELAY_MS)]
    pub worker_restart_base_delay_ms: u64,
    /// Whether crashed workers are restarted.
    #[ortho_config(default = true)]
    pub worker_auto_restart: bool,
    /// Seconds a worker gets to exit after a shutdown request.
    #[ortho_config(default = DEFAULT_WORKER_SHUTDOWN_GRACE_SECS)]
    pub worker_shutdown_grace_secs: u64,
    /// Packages granted a perpetual license at startup.
    #[ortho_config(merge_strategy = "append")]
    #[serde(default)]
    pub licensed_packages: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            builtin_root: default_builtin_root(),
            external_root: default_external_root(),
            store_path: default_store_path(),
            worker_memory_limit_mb: DEFAULT_WORKER_MEMORY_LIMIT_MB,
            worker_startup_timeout_secs: DEFAULT_WORKER_STARTUP_TIMEOUT_SECS,
            worker_request_timeout_secs: DEFAULT_WORKER_REQUEST_TIMEOUT_SECS,
            worker_health_interval_secs: DEFAULT_WORKER_HEALTH_INTERVAL_SECS,
            worker_max_restarts: DEFAULT_WORKER_MAX_RESTARTS,
            worker_restart_base_delay_ms: DEFAULT_WORKER_RESTART_BASE_DELAY_MS,
            worker_auto_restart: true,
            worker_shutdown_grace_secs: DEFAULT_WORKER_SHUTDOWN_GRACE_SECS,
            licensed_packages: Vec::new(),
        }
    }
}

impl Config {
    /// Log filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Root of the built-in package tree.
    #[must_use]
    pub fn builtin_root(&self) -> &Utf8Path {
        &self.builtin_root
    }

    /// Root of the external package tree.
    #[must_use]
    pub fn external_root(&self) -> &Utf8Path {
        &self.external_root
    }

    /// Location of the metadata store file.
    #[must_use]
    pub fn store_path(&self) -> &Utf8Path {
        &self.store_path
    }

    /// Memory ceiling for workers, `None` when disabled.
    #[must_use]
    pub const fn worker_memory_limit_mb(&self) -> Option<u64> {
        match self.worker_memory_limit_mb {
            0 => None,
            limit => Some(limit),
        }
    }

    /// Readiness deadline for a freshly spawned worker.
    #[must_use]
    pub const fn worker_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_startup_timeout_secs)
    }

    /// Deadline for a single worker request.
    #[must_use]
    pub const fn worker_request_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_request_timeout_secs)
    }

    /// Interval between worker health checks.
    #[must_use]
    pub const fn worker_health_interval(&self) -> Duration {
        Duration::from_secs(self.worker_health_interval_secs)
    }

    /// Automatic restarts allowed per worker.
    #[must_use]
    pub const fn worker_max_restarts(&self) -> u32 {
        self.worker_max_restarts
    }

    /// Restart backoff unit.
    #[must_use]
    pub const fn worker_restart_base_delay(&self) -> Duration {
        Duration::from_millis(self.worker_restart_base_delay_ms)
    }

    /// Whether crashed workers are restarted.
    #[must_use]
    pub const fn worker_auto_restart(&self) -> bool {
        self.worker_auto_restart
    }

    /// Grace period for worker shutdown.
    #[must_use]
    pub const fn worker_shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.worker_shutdown_grace_secs)
    }

    /// Packages granted a perpetual license.
    #[must_use]
    pub fn licensed_packages(&self) -> &[String] {
        &self.licensed_packages
    }
}
