//! Observable lifecycle state of a worker.

use std::fmt;
use std::time::Duration;

/// Where a worker is in its lifecycle.
///
/// ```text
/// Unstarted -> Starting -> Ready <-> Degraded -> ShuttingDown -> Stopped
///     ^            |         |
///     +------------+---------+  (crash with restarts remaining)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// No process; a restart may be pending.
    Unstarted,
    /// Process spawned, waiting for the readiness line.
    Starting,
    /// Serving requests.
    Ready,
    /// Serving requests but failing health checks.
    Degraded,
    /// Graceful shutdown in progress.
    ShuttingDown,
    /// Gone for good until started again explicitly.
    Stopped,
}

impl WorkerState {
    /// Returns a lower-case label for logs and status reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
        }
    }

    /// Returns `true` while a process exists for the worker.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Ready | Self::Degraded)
    }

    /// Returns `true` when ordinary requests may be sent.
    #[must_use]
    pub const fn accepts_requests(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a worker stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerEnd {
    /// The owner asked it to stop.
    ShutdownRequested,
    /// It crashed and will not be restarted: the restart budget is spent or
    /// automatic restarts are off.
    Failed,
}

/// Point-in-time statistics for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Current lifecycle state.
    pub state: WorkerState,
    /// Time since the current process became ready.
    pub uptime: Option<Duration>,
    /// Requests sent over the worker's lifetime.
    pub request_count: u64,
    /// Requests that failed for any reason.
    pub error_count: u64,
    /// Automatic restarts attempted.
    pub restart_count: u32,
    /// Consecutive failed health checks.
    pub health_failures: u32,
}
