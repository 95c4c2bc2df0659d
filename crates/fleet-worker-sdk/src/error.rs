//! Errors raised on the worker side of the protocol.

use fleet_packages::protocol::{RpcError, codes};
use thiserror::Error;

/// Errors that end the serving loop.
#[derive(Debug, Error)]
pub enum WorkerSdkError {
    /// Reading a request failed.
    #[error("failed to read request: {source}")]
    Read {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Writing a response failed.
    #[error("failed to write response: {source}")]
    Write {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A response could not be serialised.
    #[error("failed to serialise response: {source}")]
    Serialize {
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },
}

/// A handler's refusal to answer one request.
///
/// The loop turns it into a JSON-RPC error response and keeps serving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct HandlerError {
    code: i64,
    message: String,
}

impl HandlerError {
    /// An internal failure while handling the request.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: codes::INTERNAL_ERROR,
            message: message.into(),
        }
    }

    /// The request parameters were unusable.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: codes::INVALID_PARAMS,
            message: message.into(),
        }
    }

    /// JSON-RPC error code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        self.code
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<HandlerError> for RpcError {
    fn from(error: HandlerError) -> Self {
        Self::new(error.code, error.message)
    }
}
