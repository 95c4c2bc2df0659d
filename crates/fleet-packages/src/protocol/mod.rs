//! Wire protocol spoken between the supervisor and external workers.
//!
//! Workers exchange JSON-RPC 2.0 messages with the host, one JSON object per
//! line, over their standard input and output. Before serving requests a
//! worker prints a readiness line containing [`READY_MARKER`]. The supervisor
//! assigns request ids; workers echo them back so concurrent requests can be
//! correlated in any order.
//!
//! ```text
//! host -> worker  {"jsonrpc":"2.0","id":1,"method":"health","params":{}}
//! worker -> host  {"jsonrpc":"2.0","id":1,"result":{"healthy":true}}
//! ```

mod framing;


use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::{PackageCheckerContext, PackageCheckerResult};

pub use self::framing::{LineDecoder, MAX_LINE_BYTES};

/// JSON-RPC protocol version carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Substring a worker's readiness line must contain.
pub const READY_MARKER: &str = "\"ready\":true";

/// Environment variable holding the package directory.
pub const ENV_PACKAGE_PATH: &str = "FLEET_PACKAGE_PATH";
/// Environment variable holding the package name.
pub const ENV_PACKAGE_NAME: &str = "FLEET_PACKAGE_NAME";
/// Environment variable holding the JSON-serialised capabilities.
pub const ENV_PACKAGE_CAPABILITIES: &str = "FLEET_PACKAGE_CAPABILITIES";

/// Default deadline for a worker to print its readiness line.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
/// Default deadline for a single request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for an explicit package install.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(60);
/// Deadline for an explicit package removal.
pub const REMOVE_TIMEOUT: Duration = Duration::from_secs(45);

/// Standard JSON-RPC error codes used by workers.
pub mod codes {
    /// The request line was not valid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// The line was JSON but not a request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method is not supported.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// The parameters did not match the method.
    pub const INVALID_PARAMS: i64 = -32602;
    /// The worker failed while handling the request.
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Returns `true` when `line` carries the readiness marker.
#[must_use]
pub fn is_ready_line(line: &str) -> bool {
    line.contains(READY_MARKER)
}

/// Serialises `message` as one protocol line, newline included.
///
/// # Errors
///
/// Returns the serialisation error when `message` cannot be encoded.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

/// Methods a worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMethod {
    /// Run a checker against a context.
    Analyze,
    /// Replace the package settings.
    Configure,
    /// Report liveness.
    Health,
    /// Stop serving and exit.
    Shutdown,
}

impl WorkerMethod {
    /// Returns the method name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Configure => "configure",
            Self::Health => "health",
            Self::Shutdown => "shutdown",
        }
    }

    /// Parses a wire method name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "analyze" => Some(Self::Analyze),
            "configure" => Some(Self::Configure),
            "health" => Some(Self::Health),
            "shutdown" => Some(Self::Shutdown),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkerMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request sent to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: String,
    /// Request identifier, unique per worker.
    pub id: u64,
    /// Method to invoke.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Creates a request for `method`.
    #[must_use]
    pub fn new(id: u64, method: WorkerMethod, params: Value) -> Self {
        Self {
            jsonrpc: String::from(JSONRPC_VERSION),
            id,
            method: String::from(method.as_str()),
            params,
        }
    }
}

/// A response read from a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Protocol version.
    pub jsonrpc: String,
    /// Identifier of the request being answered. Absent when the worker
    /// could not parse the request at all.
    #[serde(default)]
    pub id: Option<u64>,
    /// Result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Creates a success response.
    #[must_use]
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: String::from(JSONRPC_VERSION),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    #[must_use]
    pub fn failure(id: Option<u64>, error: RpcError) -> Self {
        Self {
            jsonrpc: String::from(JSONRPC_VERSION),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Converts the response into its outcome.
    ///
    /// A response carrying neither a result nor an error is a `null` result.
    ///
    /// # Errors
    ///
    /// Returns the [`RpcError`] the worker reported.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates an error without structured detail.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Parameters of the `analyze` method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeParams {
    /// VM under analysis.
    pub vm_id: String,
    /// Checker to run. Workers run every checker when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checker: Option<String>,
    /// Full analysis context, settings included.
    pub context: PackageCheckerContext,
}

/// Result of the `analyze` method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResult {
    /// Recommendations produced by the checker.
    #[serde(default)]
    pub recommendations: Vec<PackageCheckerResult>,
}

/// Parameters of the `configure` method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigureParams {
    /// Settings now in effect.
    #[serde(default)]
    pub settings: Map<String, Value>,
}

/// Result of the `health` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResult {
    /// Whether the worker considers itself healthy.
    pub healthy: bool,
}
