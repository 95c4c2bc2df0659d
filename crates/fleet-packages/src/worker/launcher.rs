//! Process creation for workers.
//!
//! The supervisor never touches `tokio::process` directly. It asks a
//! [`WorkerLauncher`] for a set of [`WorkerChannels`] so that tests can
//! substitute in-memory pipes for a real subprocess.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::debug;

use super::WORKER_TARGET;
use super::settings::WorkerSettings;
use crate::error::WorkerError;
use crate::manifest::PackageManifest;
use crate::protocol::{ENV_PACKAGE_CAPABILITIES, ENV_PACKAGE_NAME, ENV_PACKAGE_PATH};

/// Byte stream written to a worker.
pub type WorkerInput = Box<dyn AsyncWrite + Send + Unpin>;
/// Byte stream read from a worker.
pub type WorkerOutput = Box<dyn AsyncRead + Send + Unpin>;

/// Everything needed to start one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Package name.
    pub package: String,
    /// Package directory, used as the working directory.
    pub package_path: PathBuf,
    /// Executable to run.
    pub program: PathBuf,
    /// Capabilities serialised as JSON.
    pub capabilities: String,
    /// Address-space ceiling in MiB.
    pub memory_limit_mb: Option<u64>,
}

impl LaunchSpec {
    /// Builds the launch description for a package.
    #[must_use]
    pub fn for_package(
        manifest: &PackageManifest,
        package_path: &Path,
        settings: &WorkerSettings,
    ) -> Self {
        let capabilities = manifest
            .capabilities()
            .and_then(|caps| serde_json::to_string(caps).ok())
            .unwrap_or_else(|| String::from("{}"));
        Self {
            package: manifest.name().to_owned(),
            package_path: package_path.to_path_buf(),
            program: package_path.join(manifest.entrypoint()),
            capabilities,
            memory_limit_mb: settings.memory_limit_mb.filter(|limit| *limit > 0),
        }
    }
}

/// A running worker process.
#[async_trait]
pub trait WorkerProcess: Send {
    /// Waits for the process to exit and returns its exit code, or `None`
    /// when it was terminated by a signal. Must be cancel safe.
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Asks the operating system to kill the process without waiting.
    ///
    /// # Errors
    ///
    /// Returns the error reported while signalling the process.
    fn start_kill(&mut self) -> io::Result<()>;

    /// Returns the OS process id while the process is running.
    fn id(&self) -> Option<u32>;
}

/// Pipes and process handle of a freshly launched worker.
pub struct WorkerChannels {
    /// Worker standard input.
    pub stdin: WorkerInput,
    /// Worker standard output.
    pub stdout: WorkerOutput,
    /// Worker diagnostic output, forwarded to the log.
    pub stderr: Option<WorkerOutput>,
    /// Process handle.
    pub process: Box<dyn WorkerProcess>,
}

/// Starts worker processes.
pub trait WorkerLauncher: Send + Sync {
    /// Launches the worker described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::SpawnFailed`] when the process cannot start.
    fn launch(&self, spec: &LaunchSpec) -> Result<WorkerChannels, WorkerError>;
}

/// Launches workers as real subprocesses.
///
/// The process runs in the package directory with stdin, stdout and stderr
/// piped and is killed when its handle is dropped. On Linux the process is
/// also confined to the configured address-space ceiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<WorkerChannels, WorkerError> {
        let mut command = Command::new(&spec.program);
        command
            .current_dir(&spec.package_path)
            .env(ENV_PACKAGE_PATH, &spec.package_path)
            .env(ENV_PACKAGE_NAME, &spec.package)
            .env(ENV_PACKAGE_CAPABILITIES, &spec.capabilities)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "linux")]
        {
            if let Some(limit) = spec.memory_limit_mb {
                limit_address_space(&mut command, limit);
            }
        }

        debug!(
            target: WORKER_TARGET,
            package = %spec.package,
            program = %spec.program.display(),
            memory_limit_mb = ?spec.memory_limit_mb,
            "spawning worker process"
        );

        let mut child = command.spawn().map_err(|error| WorkerError::SpawnFailed {
            package: spec.package.clone(),
            message: format!("failed to execute '{}'", spec.program.display()),
            source: Some(std::sync::Arc::new(error)),
        })?;

        let missing = |stream: &str| WorkerError::SpawnFailed {
            package: spec.package.clone(),
            message: format!("failed to capture {stream}"),
            source: None,
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .map(|stream| Box::new(stream) as WorkerOutput);

        Ok(WorkerChannels {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr,
            process: Box::new(ChildProcess(child)),
        })
    }
}

#[cfg(target_os = "linux")]
fn limit_address_space(command: &mut Command, limit_mb: u64) {
    use nix::libc::rlim_t;
    use nix::sys::resource::{Resource, setrlimit};

    let bytes = rlim_t::try_from(limit_mb.saturating_mul(1024 * 1024)).unwrap_or(rlim_t::MAX);
    // SAFETY: the closure runs in the forked child before exec and only
    // calls setrlimit, which is async-signal-safe.
    unsafe {
        command.pre_exec(move || {
            setrlimit(Resource::RLIMIT_AS, bytes, bytes).map_err(io::Error::from)
        });
    }
}

struct ChildProcess(Child);

#[async_trait]
impl WorkerProcess for ChildProcess {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        self.0.wait().await.map(|status| status.code())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.0.start_kill()
    }

    fn id(&self) -> Option<u32> {
        self.0.id()
    }
}
