//! Timing and restart policy for a supervised worker.

use std::time::Duration;

use crate::protocol::{REQUEST_TIMEOUT, STARTUP_TIMEOUT};

/// Default interval between health checks.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(30);
/// Consecutive failed health checks that force a restart.
pub const HEALTH_FAILURE_THRESHOLD: u32 = 3;
/// Default time a worker gets to exit after a shutdown request.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Default number of automatic restarts before giving up.
pub const MAX_RESTARTS: u32 = 3;
/// Default delay multiplied by the attempt number between restarts.
pub const RESTART_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default address-space ceiling for worker processes, in MiB.
pub const MEMORY_LIMIT_MB: u64 = 512;

/// Supervision policy applied to one worker.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use fleet_packages::WorkerSettings;
///
/// let settings = WorkerSettings::default();
/// assert_eq!(settings.restart_delay(1), Duration::from_secs(1));
/// assert_eq!(settings.restart_delay(3), Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Deadline for the readiness line after spawning.
    pub startup_timeout: Duration,
    /// Default deadline for a single request.
    pub request_timeout: Duration,
    /// Interval between health checks.
    pub health_interval: Duration,
    /// Consecutive failed health checks that force a restart.
    pub health_failure_threshold: u32,
    /// Time allowed for a graceful exit before the process is killed.
    pub shutdown_grace: Duration,
    /// Automatic restarts allowed before the worker is left stopped.
    pub max_restarts: u32,
    /// Delay unit for restart backoff.
    pub restart_base_delay: Duration,
    /// Whether crashed workers are restarted at all.
    pub auto_restart: bool,
    /// Address-space ceiling in MiB; `None` leaves the process unbounded.
    pub memory_limit_mb: Option<u64>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            startup_timeout: STARTUP_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            health_interval: HEALTH_INTERVAL,
            health_failure_threshold: HEALTH_FAILURE_THRESHOLD,
            shutdown_grace: SHUTDOWN_GRACE,
            max_restarts: MAX_RESTARTS,
            restart_base_delay: RESTART_BASE_DELAY,
            auto_restart: true,
            memory_limit_mb: Some(MEMORY_LIMIT_MB),
        }
    }
}

impl WorkerSettings {
    /// Returns the delay before restart `attempt`, counted from one.
    #[must_use]
    pub const fn restart_delay(&self, attempt: u32) -> Duration {
        self.restart_base_delay.saturating_mul(attempt)
    }
}
