//! Domain errors raised by package operations.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! so [`WorkerError`] stays `Clone`: a single process exit has to be reported
//! to every request still waiting on that worker.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// A single manifest violation tagged with the offending field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    field: String,
    message: String,
}

impl FieldError {
    /// Creates a field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the field path, for example `checkers[0].name`.
    #[must_use]
    pub const fn field(&self) -> &str {
        self.field.as_str()
    }

    /// Returns the human-readable message.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found while validating one manifest.
///
/// Validation never stops at the first problem, so a package author sees the
/// complete list in a single pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
#[error("manifest is invalid: {}", render_field_errors(.errors))]
pub struct ManifestErrors {
    errors: Vec<FieldError>,
}

impl ManifestErrors {
    /// Creates an error list holding a single violation.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub(crate) fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Returns the collected violations.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Returns `true` when a violation was recorded against `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }

    /// Returns the number of violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` when no violations were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

fn render_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure reported by a built-in checker.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CheckerError {
    message: String,
}

impl CheckerError {
    /// Creates a checker error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the failure description.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Errors arising from a supervised worker process.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// The worker never printed the readiness marker.
    #[error("worker '{package}' did not signal readiness within {timeout:?}")]
    StartupTimeout {
        /// Package name.
        package: String,
        /// Configured startup timeout.
        timeout: Duration,
    },

    /// The worker closed its output before signalling readiness.
    #[error("worker '{package}' exited before signalling readiness")]
    ExitedBeforeReady {
        /// Package name.
        package: String,
    },

    /// The worker process could not be spawned.
    #[error("worker '{package}' failed to start: {message}")]
    SpawnFailed {
        /// Package name.
        package: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// A request received no response within its timeout.
    #[error("request {request_id} ({method}) to worker '{package}' timed out after {timeout:?}")]
    RequestTimeout {
        /// Package name.
        package: String,
        /// Method that was called.
        method: String,
        /// Identifier of the abandoned request.
        request_id: u64,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The worker process exited while requests were outstanding.
    #[error("worker '{package}' exited unexpectedly (status {})", render_status(.status))]
    UnexpectedExit {
        /// Package name.
        package: String,
        /// Exit code, absent when the process was killed by a signal.
        status: Option<i32>,
    },

    /// The worker answered with a JSON-RPC error object.
    #[error("worker '{package}' returned error {code}: {message}")]
    Remote {
        /// Package name.
        package: String,
        /// JSON-RPC error code.
        code: i64,
        /// Error message supplied by the worker.
        message: String,
        /// Optional structured error data.
        data: Option<serde_json::Value>,
    },

    /// The worker is not accepting requests.
    #[error("worker '{package}' is not running")]
    NotRunning {
        /// Package name.
        package: String,
    },

    /// Writing to or reading from the worker failed.
    #[error("I/O error communicating with worker '{package}': {source}")]
    Io {
        /// Package name.
        package: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The worker answered with a payload of the wrong shape.
    #[error("worker '{package}' sent an invalid payload: {message}")]
    InvalidPayload {
        /// Package name.
        package: String,
        /// Description of the shape mismatch.
        message: String,
    },
}

fn render_status(status: &Option<i32>) -> String {
    status.map_or_else(|| String::from("signal"), |code| code.to_string())
}

/// Errors arising from registry operations.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The manifest file could not be read.
    #[error("failed to read manifest '{}': {source}", path.display())]
    ManifestRead {
        /// Path of the manifest file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The manifest failed validation.
    #[error("package at '{}' has an invalid manifest: {errors}", path.display())]
    Manifest {
        /// Package directory.
        path: PathBuf,
        /// Every violation found.
        errors: ManifestErrors,
    },

    /// A package with the same name is already registered.
    #[error("package '{name}' is already loaded")]
    AlreadyLoaded {
        /// Conflicting package name.
        name: String,
    },

    /// The package requires a newer host platform.
    #[error("package '{name}' requires platform {required}, host is {host}")]
    IncompatiblePlatform {
        /// Package name.
        name: String,
        /// Minimum platform version declared by the package.
        required: String,
        /// Version of the running host.
        host: String,
    },

    /// No package with the given name is registered.
    #[error("package '{name}' is not loaded")]
    PackageNotFound {
        /// Name that was looked up.
        name: String,
    },

    /// The package does not declare the requested checker.
    #[error("package '{package}' has no checker '{checker}'")]
    CheckerNotFound {
        /// Package name.
        package: String,
        /// Checker name that was looked up.
        checker: String,
    },

    /// A built-in checker failed while analysing.
    #[error("checker '{package}/{checker}' failed: {source}")]
    Checker {
        /// Package name.
        package: String,
        /// Checker name.
        checker: String,
        /// Failure reported by the checker.
        #[source]
        source: CheckerError,
    },

    /// An explicit install or removal exceeded its deadline.
    #[error("{operation} of package '{name}' did not finish within {timeout:?}")]
    OperationTimeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Package name or directory.
        name: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The worker backing an external package failed.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// The metadata store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests;
