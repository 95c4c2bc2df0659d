//! Supervision of external package workers.
//!
//! Every external package runs in its own subprocess, owned by a
//! [`WorkerSupervisor`]. The supervisor spawns the process, waits for its
//! readiness line, correlates concurrent requests with responses by id,
//! polls the worker's health and restarts it with linear backoff after a
//! crash. Each spawn of the process is a *session* identified by a
//! generation number; events from an older session never touch a newer one.
//!
//! Supervisor state lives behind short-lived `std` mutexes that are never
//! held across an `.await`. The write half of the worker's stdin sits behind
//! an async mutex so concurrent requests serialise their lines.

mod launcher;
mod pending;
mod settings;
mod state;

#[cfg(test)]
pub(crate) mod test_support;
#[cfg(test)]
mod tests;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout, timeout_at};
use tracing::{debug, error, info, warn};

use crate::context::{PackageCheckerContext, PackageCheckerResult};
use crate::error::WorkerError;
use crate::manifest::PackageManifest;
use crate::protocol::{
    AnalyzeParams, AnalyzeResult, ConfigureParams, HealthResult, LineDecoder, RpcRequest,
    RpcResponse, WorkerMethod, encode_line, is_ready_line,
};

pub use self::launcher::{
    LaunchSpec, ProcessLauncher, WorkerChannels, WorkerInput, WorkerLauncher, WorkerOutput,
    WorkerProcess,
};
pub use self::settings::WorkerSettings;
pub use self::state::{WorkerEnd, WorkerState, WorkerStats};

use self::pending::{PendingTable, Reply};

/// Tracing target for worker supervision.
pub(crate) const WORKER_TARGET: &str = "fleet_packages::worker";

/// Size of each read from worker stdout.
const READ_CHUNK: usize = 8 * 1024;

/// Exit status reported on the watch channel; `None` while running.
type ExitSignal = Option<Option<i32>>;

/// Handle to one supervised worker.
///
/// Clones share the same worker.
#[derive(Clone)]
pub struct WorkerSupervisor {
    inner: Arc<Shared>,
}

struct Shared {
    manifest: PackageManifest,
    package_path: PathBuf,
    settings: WorkerSettings,
    launcher: Arc<dyn WorkerLauncher>,
    pending: Mutex<PendingTable>,
    writer: tokio::sync::Mutex<Option<(u64, WorkerInput)>>,
    lifecycle: Mutex<Lifecycle>,
    request_count: AtomicU64,
    error_count: AtomicU64,
    restart_count: AtomicU32,
    ended: watch::Sender<Option<WorkerEnd>>,
}

struct Lifecycle {
    state: WorkerState,
    generation: u64,
    restart_attempts: u32,
    health_failures: u32,
    shutdown_requested: bool,
    ready_at: Option<Instant>,
    session: Option<Session>,
}

/// One spawn of the worker process.
struct Session {
    generation: u64,
    serving: bool,
    kill: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<ExitSignal>,
    health: Option<JoinHandle<()>>,
}

impl Session {
    fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            // The monitor is already gone when the process has exited.
            if kill.send(()).is_err() {
                debug!(target: WORKER_TARGET, generation = self.generation, "process already exited");
            }
        }
    }

    fn stop_health(&mut self) {
        if let Some(task) = self.health.take() {
            task.abort();
        }
    }

    fn has_exited(&self) -> bool {
        self.exited.borrow().is_some()
    }
}

enum ExitAction {
    None,
    Restart { attempt: u32, delay: Duration },
    GiveUp,
}

enum HealthVerdict {
    Continue,
    ForceRestart,
    Stale,
}

impl WorkerSupervisor {
    /// Creates a supervisor without starting the worker.
    #[must_use]
    pub fn new(
        manifest: PackageManifest,
        package_path: impl Into<PathBuf>,
        settings: WorkerSettings,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Self {
        Self {
            inner: Arc::new(Shared {
                manifest,
                package_path: package_path.into(),
                settings,
                launcher,
                pending: Mutex::new(PendingTable::default()),
                writer: tokio::sync::Mutex::new(None),
                lifecycle: Mutex::new(Lifecycle {
                    state: WorkerState::Unstarted,
                    generation: 0,
                    restart_attempts: 0,
                    health_failures: 0,
                    shutdown_requested: false,
                    ready_at: None,
                    session: None,
                }),
                request_count: AtomicU64::new(0),
                error_count: AtomicU64::new(0),
                restart_count: AtomicU32::new(0),
                ended: watch::Sender::new(None),
            }),
        }
    }

    /// Creates a supervisor and starts the worker.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::StartupTimeout`] when the worker does not
    /// signal readiness in time, [`WorkerError::ExitedBeforeReady`] when it
    /// exits first, or [`WorkerError::SpawnFailed`] when it cannot start.
    pub async fn spawn(
        manifest: PackageManifest,
        package_path: impl Into<PathBuf>,
        settings: WorkerSettings,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Result<Self, WorkerError> {
        let supervisor = Self::new(manifest, package_path, settings, launcher);
        supervisor.start().await?;
        Ok(supervisor)
    }

    /// Starts the worker if no process is live.
    ///
    /// # Errors
    ///
    /// See [`WorkerSupervisor::spawn`].
    pub async fn start(&self) -> Result<(), WorkerError> {
        {
            let mut life = self.inner.lifecycle();
            if life.state.is_live() {
                return Ok(());
            }
            life.shutdown_requested = false;
            life.restart_attempts = 0;
        }
        self.inner.ended.send_replace(None);
        self.inner.start_session().await
    }

    /// Returns the package name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Returns the package manifest.
    #[must_use]
    pub fn manifest(&self) -> &PackageManifest {
        &self.inner.manifest
    }

    /// Returns the package directory.
    #[must_use]
    pub fn package_path(&self) -> &Path {
        &self.inner.package_path
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.inner.lifecycle().state
    }

    /// Returns `true` while the worker accepts requests.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state().accepts_requests()
    }

    /// Returns current statistics.
    #[must_use]
    pub fn stats(&self) -> WorkerStats {
        let life = self.inner.lifecycle();
        WorkerStats {
            state: life.state,
            uptime: life.ready_at.map(|ready_at| ready_at.elapsed()),
            request_count: self.inner.request_count.load(Ordering::Relaxed),
            error_count: self.inner.error_count.load(Ordering::Relaxed),
            restart_count: self.inner.restart_count.load(Ordering::Relaxed),
            health_failures: life.health_failures,
        }
    }

    /// Sends a request with the default request timeout.
    ///
    /// # Errors
    ///
    /// See [`WorkerSupervisor::send_with_timeout`].
    pub async fn send(&self, method: WorkerMethod, params: Value) -> Result<Value, WorkerError> {
        self.send_with_timeout(method, params, self.inner.settings.request_timeout)
            .await
    }

    /// Sends a request and waits up to `limit` for the response.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::NotRunning`] when the worker is not serving,
    /// [`WorkerError::RequestTimeout`] when no response arrives in time,
    /// [`WorkerError::UnexpectedExit`] when the worker dies first and
    /// [`WorkerError::Remote`] when the worker answers with an error.
    pub async fn send_with_timeout(
        &self,
        method: WorkerMethod,
        params: Value,
        limit: Duration,
    ) -> Result<Value, WorkerError> {
        let outcome = self.inner.request(method, params, limit).await;
        if outcome.is_err() {
            self.inner.error_count.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    /// Runs `checker` (or every checker when `None`) against `context`.
    ///
    /// # Errors
    ///
    /// Returns any [`WorkerError`] raised by the request, or
    /// [`WorkerError::InvalidPayload`] when the result is malformed.
    pub async fn analyze(
        &self,
        context: &PackageCheckerContext,
        checker: Option<&str>,
    ) -> Result<Vec<PackageCheckerResult>, WorkerError> {
        let request = AnalyzeParams {
            vm_id: context.vm_id.clone(),
            checker: checker.map(str::to_owned),
            context: context.clone(),
        };
        let params = serde_json::to_value(&request).map_err(|error| self.inner.payload(&error))?;
        let result = self.send(WorkerMethod::Analyze, params).await?;
        let parsed: AnalyzeResult =
            serde_json::from_value(result).map_err(|error| self.inner.payload(&error))?;
        Ok(parsed.recommendations)
    }

    /// Pushes new settings to the worker.
    ///
    /// # Errors
    ///
    /// Returns any [`WorkerError`] raised by the request.
    pub async fn configure(&self, settings: &Map<String, Value>) -> Result<(), WorkerError> {
        let request = ConfigureParams {
            settings: settings.clone(),
        };
        let params = serde_json::to_value(&request).map_err(|error| self.inner.payload(&error))?;
        self.send(WorkerMethod::Configure, params).await?;
        Ok(())
    }

    /// Checks the worker health. Any failure counts as unhealthy.
    pub async fn health(&self) -> bool {
        match self.send(WorkerMethod::Health, json!({})).await {
            Ok(result) => serde_json::from_value::<HealthResult>(result)
                .is_ok_and(|health| health.healthy),
            Err(error) => {
                debug!(
                    target: WORKER_TARGET,
                    package = self.name(),
                    %error,
                    "health check failed"
                );
                false
            }
        }
    }

    /// Waits until the worker has stopped for good and says why.
    ///
    /// Returns at once when that already happened. A later
    /// [`WorkerSupervisor::start`] begins a new lifetime.
    pub async fn ended(&self) -> WorkerEnd {
        let mut ended = self.inner.ended.subscribe();
        ended
            .wait_for(Option::is_some)
            .await
            .map_or(WorkerEnd::ShutdownRequested, |end| {
                (*end).unwrap_or(WorkerEnd::ShutdownRequested)
            })
    }

    /// Returns `true` when both handles drive the same worker.
    #[must_use]
    pub fn same_worker(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Kills the current process so the crash path restarts it.
    pub fn force_restart(&self) {
        let generation = self.inner.lifecycle().generation;
        info!(target: WORKER_TARGET, package = self.name(), "forcing worker restart");
        self.inner.request_kill(generation);
    }

    /// Stops the worker.
    ///
    /// Health polling stops first. The worker is then asked to shut down and
    /// its stdin is closed; a process still running when the grace period
    /// ends is killed. Never fails; errors are logged.
    pub async fn shutdown(&self) {
        let exited = {
            let mut life = self.inner.lifecycle();
            life.shutdown_requested = true;
            self.inner.ended.send_replace(Some(WorkerEnd::ShutdownRequested));
            let Some(session) = life.session.as_mut() else {
                life.state = WorkerState::Stopped;
                return;
            };
            session.stop_health();
            let exited = session.exited.clone();
            life.state = WorkerState::ShuttingDown;
            exited
        };

        let grace = self.inner.settings.shutdown_grace;
        let deadline = Instant::now() + grace;
        if let Err(error) = self
            .send_with_timeout(WorkerMethod::Shutdown, json!({}), grace)
            .await
        {
            debug!(
                target: WORKER_TARGET,
                package = self.name(),
                %error,
                "shutdown request failed"
            );
        }
        self.inner.close_stdin().await;
        self.inner.await_exit(exited, deadline).await;
        self.inner.lifecycle().state = WorkerState::Stopped;
        info!(target: WORKER_TARGET, package = self.name(), "worker stopped");
    }
}

impl fmt::Debug for WorkerSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSupervisor")
            .field("package", &self.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn name(&self) -> &str {
        self.manifest.name()
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn payload(&self, error: &serde_json::Error) -> WorkerError {
        WorkerError::InvalidPayload {
            package: self.name().to_owned(),
            message: error.to_string(),
        }
    }

    fn exit_error(&self, status: Option<i32>) -> WorkerError {
        WorkerError::UnexpectedExit {
            package: self.name().to_owned(),
            status,
        }
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    async fn start_session(self: &Arc<Self>) -> Result<(), WorkerError> {
        let generation = {
            let mut life = self.lifecycle();
            life.generation = life.generation.saturating_add(1);
            life.state = WorkerState::Starting;
            life.health_failures = 0;
            life.ready_at = None;
            life.generation
        };

        let spec = LaunchSpec::for_package(&self.manifest, &self.package_path, &self.settings);
        let channels = match self.launcher.launch(&spec) {
            Ok(channels) => channels,
            Err(error) => {
                self.abandon(generation).await;
                return Err(error);
            }
        };
        let WorkerChannels {
            stdin,
            stdout,
            stderr,
            process,
        } = channels;

        *self.writer.lock().await = Some((generation, stdin));
        if let Some(stderr) = stderr {
            tokio::spawn(forward_stderr(self.name().to_owned(), stderr));
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        self.lifecycle().session = Some(Session {
            generation,
            serving: false,
            kill: Some(kill_tx),
            exited: exit_rx,
            health: None,
        });
        tokio::spawn(Arc::clone(self).read_loop(generation, stdout, ready_tx));
        tokio::spawn(Arc::clone(self).monitor_exit(generation, process, kill_rx, exit_tx));

        let failure = match timeout(self.settings.startup_timeout, ready_rx).await {
            Ok(Ok(())) if self.mark_ready(generation) => return Ok(()),
            Ok(_) => WorkerError::ExitedBeforeReady {
                package: self.name().to_owned(),
            },
            Err(_) => WorkerError::StartupTimeout {
                package: self.name().to_owned(),
                timeout: self.settings.startup_timeout,
            },
        };
        warn!(target: WORKER_TARGET, package = self.name(), error = %failure, "worker failed to start");
        self.abandon(generation).await;
        Err(failure)
    }

    /// Promotes session `generation` to serving. Returns `false` when the
    /// session was superseded, has exited or shutdown was requested.
    fn mark_ready(self: &Arc<Self>, generation: u64) -> bool {
        let mut life = self.lifecycle();
        if life.shutdown_requested {
            return false;
        }
        let Some(session) = life
            .session
            .as_mut()
            .filter(|session| session.generation == generation && !session.has_exited())
        else {
            return false;
        };
        session.serving = true;
        session.health = Some(tokio::spawn(Arc::clone(self).health_loop(generation)));
        life.state = WorkerState::Ready;
        life.restart_attempts = 0;
        life.health_failures = 0;
        life.ready_at = Some(Instant::now());
        info!(target: WORKER_TARGET, package = self.name(), generation, "worker ready");
        true
    }

    /// Tears down a session that never became ready.
    async fn abandon(&self, generation: u64) {
        {
            let mut life = self.lifecycle();
            if life.generation != generation {
                return;
            }
            life.state = WorkerState::Stopped;
            if let Some(mut session) = life.session.take() {
                session.stop_health();
                session.kill();
            }
        }
        self.clear_writer(generation).await;
    }

    fn request_kill(&self, generation: u64) {
        let mut life = self.lifecycle();
        if let Some(session) = life
            .session
            .as_mut()
            .filter(|session| session.generation == generation)
        {
            session.kill();
        }
    }

    async fn clear_writer(&self, generation: u64) {
        let mut writer = self.writer.lock().await;
        if writer.as_ref().is_some_and(|(owner, _)| *owner == generation) {
            *writer = None;
        }
    }

    async fn close_stdin(&self) {
        if let Some((_, mut stdin)) = self.writer.lock().await.take() {
            if let Err(error) = stdin.shutdown().await {
                debug!(target: WORKER_TARGET, package = self.name(), %error, "closing stdin failed");
            }
        }
    }

    async fn await_exit(&self, mut exited: watch::Receiver<ExitSignal>, deadline: Instant) {
        let in_time = timeout_at(deadline, exited.wait_for(Option::is_some))
            .await
            .is_ok();
        if in_time {
            return;
        }
        warn!(
            target: WORKER_TARGET,
            package = self.name(),
            grace = ?self.settings.shutdown_grace,
            "worker did not exit in time, killing"
        );
        let generation = self.lifecycle().generation;
        self.request_kill(generation);
        if exited.wait_for(Option::is_some).await.is_err() {
            debug!(target: WORKER_TARGET, package = self.name(), "exit monitor ended");
        }
    }

    // -----------------------------------------------------------------------
    // Session tasks
    // -----------------------------------------------------------------------

    async fn read_loop(
        self: Arc<Self>,
        generation: u64,
        mut stdout: WorkerOutput,
        ready_tx: oneshot::Sender<()>,
    ) {
        let mut decoder = LineDecoder::new();
        let mut ready_tx = Some(ready_tx);
        let mut buffer = vec![0_u8; READ_CHUNK];
        loop {
            let read = match stdout.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(error) => {
                    warn!(target: WORKER_TARGET, package = self.name(), %error, "reading worker output failed");
                    break;
                }
            };
            for line in decoder.push(buffer.get(..read).unwrap_or_default()) {
                if ready_tx.is_none() {
                    self.dispatch_line(&line);
                } else if is_ready_line(&line) {
                    if let Some(ready) = ready_tx.take() {
                        if ready.send(()).is_err() {
                            debug!(target: WORKER_TARGET, package = self.name(), "readiness arrived after startup gave up");
                        }
                    }
                } else {
                    debug!(target: WORKER_TARGET, package = self.name(), %line, "ignoring output before readiness");
                }
            }
        }
        debug!(target: WORKER_TARGET, package = self.name(), generation, "worker output closed");
    }

    fn dispatch_line(&self, line: &str) {
        let response: RpcResponse = match serde_json::from_str(line) {
            Ok(response) => response,
            Err(error) => {
                warn!(target: WORKER_TARGET, package = self.name(), %error, "discarding malformed worker output");
                return;
            }
        };
        let Some(id) = response.id else {
            warn!(target: WORKER_TARGET, package = self.name(), "discarding response without id");
            return;
        };
        let reply: Reply = response.into_result().map_err(|error| WorkerError::Remote {
            package: self.name().to_owned(),
            code: error.code,
            message: error.message,
            data: error.data,
        });
        if !self.pending().resolve(id, reply) {
            warn!(
                target: WORKER_TARGET,
                package = self.name(),
                request_id = id,
                "dropping response for unknown request"
            );
        }
    }

    async fn monitor_exit(
        self: Arc<Self>,
        generation: u64,
        mut process: Box<dyn WorkerProcess>,
        kill_rx: oneshot::Receiver<()>,
        exit_tx: watch::Sender<ExitSignal>,
    ) {
        let waited = tokio::select! {
            status = process.wait() => Some(status),
            _ = kill_rx => None,
        };
        let status = match waited {
            Some(status) => status,
            None => {
                if let Err(error) = process.start_kill() {
                    debug!(target: WORKER_TARGET, package = self.name(), %error, "kill failed");
                }
                process.wait().await
            }
        };
        let code = status.unwrap_or_else(|error| {
            warn!(target: WORKER_TARGET, package = self.name(), %error, "waiting for worker failed");
            None
        });
        exit_tx.send_replace(Some(code));
        self.on_exit(generation, code).await;
    }

    async fn on_exit(self: &Arc<Self>, generation: u64, code: Option<i32>) {
        let action = {
            let mut life = self.lifecycle();
            let Some(mut session) = life
                .session
                .take_if(|session| session.generation == generation)
            else {
                return;
            };
            session.stop_health();
            life.ready_at = None;
            if life.shutdown_requested {
                life.state = WorkerState::Stopped;
                ExitAction::None
            } else if !session.serving {
                ExitAction::None
            } else if self.settings.auto_restart
                && life.restart_attempts < self.settings.max_restarts
            {
                life.restart_attempts = life.restart_attempts.saturating_add(1);
                life.state = WorkerState::Unstarted;
                ExitAction::Restart {
                    attempt: life.restart_attempts,
                    delay: self.settings.restart_delay(life.restart_attempts),
                }
            } else {
                life.state = WorkerState::Stopped;
                ExitAction::GiveUp
            }
        };

        let rejected = self.pending().reject_all(&self.exit_error(code));
        self.clear_writer(generation).await;

        match action {
            ExitAction::None => {
                debug!(target: WORKER_TARGET, package = self.name(), status = ?code, "worker exited");
            }
            ExitAction::Restart { attempt, delay } => {
                warn!(
                    target: WORKER_TARGET,
                    package = self.name(),
                    status = ?code,
                    rejected,
                    attempt,
                    delay = ?delay,
                    "worker crashed, scheduling restart"
                );
                self.schedule_restart(attempt, delay);
            }
            ExitAction::GiveUp => {
                self.ended.send_replace(Some(WorkerEnd::Failed));
                error!(
                    target: WORKER_TARGET,
                    package = self.name(),
                    status = ?code,
                    rejected,
                    "worker crashed and will not be restarted"
                );
            }
        }
    }

    fn schedule_restart(self: &Arc<Self>, attempt: u32, delay: Duration) {
        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.restart_after(attempt, delay).await });
    }

    async fn restart_after(self: Arc<Self>, first_attempt: u32, first_delay: Duration) {
        let mut attempt = first_attempt;
        let mut delay = first_delay;
        loop {
            sleep(delay).await;
            if self.lifecycle().shutdown_requested {
                return;
            }
            self.restart_count.fetch_add(1, Ordering::Relaxed);
            info!(target: WORKER_TARGET, package = self.name(), attempt, "restarting worker");
            let Err(error) = self.start_session().await else {
                return;
            };

            let next = {
                let mut life = self.lifecycle();
                if life.shutdown_requested {
                    return;
                }
                if life.restart_attempts < self.settings.max_restarts {
                    life.restart_attempts = life.restart_attempts.saturating_add(1);
                    life.state = WorkerState::Unstarted;
                    Some(life.restart_attempts)
                } else {
                    life.state = WorkerState::Stopped;
                    None
                }
            };
            let Some(next) = next else {
                self.ended.send_replace(Some(WorkerEnd::Failed));
                error!(
                    target: WORKER_TARGET,
                    package = self.name(),
                    %error,
                    "restart budget exhausted"
                );
                return;
            };
            warn!(target: WORKER_TARGET, package = self.name(), attempt, %error, "restart failed");
            attempt = next;
            delay = self.settings.restart_delay(next);
        }
    }

    async fn health_loop(self: Arc<Self>, generation: u64) {
        let period = self.settings.health_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let healthy = WorkerSupervisor {
                inner: Arc::clone(&self),
            }
            .health()
            .await;
            match self.record_health(generation, healthy) {
                HealthVerdict::Continue => {}
                HealthVerdict::Stale => return,
                HealthVerdict::ForceRestart => {
                    warn!(
                        target: WORKER_TARGET,
                        package = self.name(),
                        failures = self.settings.health_failure_threshold,
                        "worker failed consecutive health checks, restarting"
                    );
                    self.request_kill(generation);
                    return;
                }
            }
        }
    }

    fn record_health(&self, generation: u64, healthy: bool) -> HealthVerdict {
        let mut life = self.lifecycle();
        if life.generation != generation || !life.state.accepts_requests() {
            return HealthVerdict::Stale;
        }
        if healthy {
            life.health_failures = 0;
            if life.state == WorkerState::Degraded {
                info!(target: WORKER_TARGET, package = self.name(), "worker recovered");
                life.state = WorkerState::Ready;
            }
            return HealthVerdict::Continue;
        }
        life.health_failures = life.health_failures.saturating_add(1);
        life.state = WorkerState::Degraded;
        if life.health_failures >= self.settings.health_failure_threshold {
            life.health_failures = 0;
            return HealthVerdict::ForceRestart;
        }
        HealthVerdict::Continue
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    async fn request(
        &self,
        method: WorkerMethod,
        params: Value,
        limit: Duration,
    ) -> Result<Value, WorkerError> {
        let state = self.lifecycle().state;
        let allowed = state.accepts_requests()
            || (state == WorkerState::ShuttingDown && method == WorkerMethod::Shutdown);
        if !allowed {
            return Err(WorkerError::NotRunning {
                package: self.name().to_owned(),
            });
        }

        let (id, reply_rx) = self.pending().register();
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let line = match encode_line(&RpcRequest::new(id, method, params)) {
            Ok(line) => line,
            Err(error) => {
                self.pending().cancel(id);
                return Err(self.payload(&error));
            }
        };

        let exchange = async {
            self.write_line(&line).await?;
            reply_rx
                .await
                .unwrap_or_else(|_| Err(self.exit_error(None)))
        };
        match timeout(limit, exchange).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => {
                self.pending().cancel(id);
                Err(error)
            }
            Err(_) => {
                self.pending().cancel(id);
                warn!(
                    target: WORKER_TARGET,
                    package = self.name(),
                    request_id = id,
                    method = method.as_str(),
                    "request timed out"
                );
                Err(WorkerError::RequestTimeout {
                    package: self.name().to_owned(),
                    method: method.as_str().to_owned(),
                    request_id: id,
                    timeout: limit,
                })
            }
        }
    }

    async fn write_line(&self, line: &[u8]) -> Result<(), WorkerError> {
        let mut writer = self.writer.lock().await;
        let Some((_, stdin)) = writer.as_mut() else {
            return Err(WorkerError::NotRunning {
                package: self.name().to_owned(),
            });
        };
        let io_error = |source| WorkerError::Io {
            package: self.name().to_owned(),
            source: Arc::new(source),
        };
        stdin.write_all(line).await.map_err(io_error)?;
        stdin.flush().await.map_err(io_error)
    }
}

async fn forward_stderr(package: String, stderr: WorkerOutput) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: WORKER_TARGET, package = %package, stream = "stderr", "{line}");
            }
            Ok(None) => break,
            Err(error) => {
                debug!(target: WORKER_TARGET, package = %package, %error, "stderr closed");
                break;
            }
        }
    }
}
