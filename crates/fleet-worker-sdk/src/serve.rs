//! The request loop run by a worker process.

use std::io::{BufRead, Write};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use fleet_packages::protocol::{
    AnalyzeParams, AnalyzeResult, ConfigureParams, HealthResult, RpcError, RpcRequest,
    RpcResponse, WorkerMethod, codes, encode_line,
};

use crate::error::{HandlerError, WorkerSdkError};

const SDK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::serve");

/// Package-specific behaviour behind the protocol.
pub trait WorkerHandler {
    /// Runs one or all checkers against the supplied context.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the analysis cannot be completed.
    fn analyze(&mut self, params: AnalyzeParams) -> Result<AnalyzeResult, HandlerError>;

    /// Replaces the package settings.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the settings are unusable.
    fn configure(&mut self, params: ConfigureParams) -> Result<(), HandlerError>;

    /// Reports liveness. Healthy unless overridden.
    fn health(&mut self) -> HealthResult {
        HealthResult { healthy: true }
    }
}

/// Why [`serve`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The host asked the worker to stop.
    ShutdownRequested,
    /// The host closed the worker's input.
    InputClosed,
}

/// Announces readiness, then answers requests until shutdown or end of input.
///
/// Every response is flushed as soon as it is written.
///
/// # Errors
///
/// Returns a [`WorkerSdkError`] when the streams fail; protocol errors are
/// answered instead.
pub fn serve<R, W, H>(
    input: &mut R,
    output: &mut W,
    handler: &mut H,
) -> Result<ServeOutcome, WorkerSdkError>
where
    R: BufRead + ?Sized,
    W: Write + ?Sized,
    H: WorkerHandler + ?Sized,
{
    write_message(output, &json!({ "ready": true }))?;
    debug!(target: SDK_TARGET, "worker ready");

    let mut line = String::new();
    loop {
        line.clear();
        let read = input
            .read_line(&mut line)
            .map_err(|source| WorkerSdkError::Read { source })?;
        if read == 0 {
            debug!(target: SDK_TARGET, "input closed");
            return Ok(ServeOutcome::InputClosed);
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let (response, stop) = match parse_request(text) {
            Ok(request) => dispatch(handler, request),
            Err(response) => (*response, false),
        };
        write_message(output, &response)?;
        if stop {
            debug!(target: SDK_TARGET, "shutdown requested");
            return Ok(ServeOutcome::ShutdownRequested);
        }
    }
}

fn parse_request(text: &str) -> Result<RpcRequest, Box<RpcResponse>> {
    let value: Value = serde_json::from_str(text).map_err(|error| {
        warn!(target: SDK_TARGET, %error, "unparseable request line");
        Box::new(RpcResponse::failure(
            None,
            RpcError::new(codes::PARSE_ERROR, format!("invalid JSON: {error}")),
        ))
    })?;
    let id = value.get("id").and_then(Value::as_u64);
    serde_json::from_value(value).map_err(|error| {
        Box::new(RpcResponse::failure(
            id,
            RpcError::new(codes::INVALID_REQUEST, format!("invalid request: {error}")),
        ))
    })
}

/// Answers one request; the flag is set when the worker should stop.
fn dispatch<H>(handler: &mut H, request: RpcRequest) -> (RpcResponse, bool)
where
    H: WorkerHandler + ?Sized,
{
    let RpcRequest {
        id, method, params, ..
    } = request;
    let Some(known) = WorkerMethod::parse(&method) else {
        warn!(target: SDK_TARGET, request_id = id, method, "unknown method");
        return (
            RpcResponse::failure(
                Some(id),
                RpcError::new(codes::METHOD_NOT_FOUND, format!("method '{method}' not found")),
            ),
            false,
        );
    };
    debug!(target: SDK_TARGET, request_id = id, method = %known, "handling request");

    let outcome = match known {
        WorkerMethod::Analyze => params_as::<AnalyzeParams>(params)
            .and_then(|parsed| handler.analyze(parsed))
            .and_then(|result| to_value(&result)),
        WorkerMethod::Configure => params_as::<ConfigureParams>(params)
            .and_then(|parsed| handler.configure(parsed))
            .map(|()| Value::Null),
        WorkerMethod::Health => to_value(&handler.health()),
        WorkerMethod::Shutdown => return (RpcResponse::success(id, Value::Null), true),
    };

    let response = match outcome {
        Ok(result) => RpcResponse::success(id, result),
        Err(error) => {
            warn!(target: SDK_TARGET, request_id = id, %error, "request failed");
            RpcResponse::failure(Some(id), error.into())
        }
    };
    (response, false)
}

fn params_as<T: DeserializeOwned>(params: Value) -> Result<T, HandlerError> {
    let normalised = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(normalised).map_err(|error| HandlerError::invalid_params(error.to_string()))
}

fn to_value<T: serde::Serialize>(result: &T) -> Result<Value, HandlerError> {
    serde_json::to_value(result).map_err(|error| HandlerError::new(error.to_string()))
}

fn write_message<W, T>(output: &mut W, message: &T) -> Result<(), WorkerSdkError>
where
    W: Write + ?Sized,
    T: serde::Serialize,
{
    let line = encode_line(message).map_err(|source| WorkerSdkError::Serialize { source })?;
    output
        .write_all(&line)
        .map_err(|source| WorkerSdkError::Write { source })?;
    output
        .flush()
        .map_err(|source| WorkerSdkError::Write { source })
}
