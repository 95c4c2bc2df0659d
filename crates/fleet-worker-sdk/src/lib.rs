//! Worker side of the fleet package protocol.
//!
//! An external package ships an executable that the host supervises. The
//! executable talks newline-delimited JSON-RPC over its standard streams:
//! it announces readiness once, then answers `analyze`, `configure`,
//! `health` and `shutdown` requests in the order they arrive.
//!
//! [`serve`] implements that loop on top of a [`WorkerHandler`]. Malformed
//! input never ends the loop; it is answered with a JSON-RPC error so the
//! host can fail the one request concerned.
//!
//! ```no_run
//! use std::io::{self, BufReader};
//!
//! use fleet_packages::protocol::{AnalyzeParams, AnalyzeResult, ConfigureParams};
//! use fleet_worker_sdk::{HandlerError, WorkerHandler, serve};
//!
//! struct Quiet;
//!
//! impl WorkerHandler for Quiet {
//!     fn analyze(&mut self, _params: AnalyzeParams) -> Result<AnalyzeResult, HandlerError> {
//!         Ok(AnalyzeResult::default())
//!     }
//!
//!     fn configure(&mut self, _params: ConfigureParams) -> Result<(), HandlerError> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), fleet_worker_sdk::WorkerSdkError> {
//! let mut input = BufReader::new(io::stdin().lock());
//! let mut output = io::stdout().lock();
//! serve(&mut input, &mut output, &mut Quiet)?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod sample;
mod serve;


pub use error::{HandlerError, WorkerSdkError};
pub use serve::{ServeOutcome, WorkerHandler, serve};
