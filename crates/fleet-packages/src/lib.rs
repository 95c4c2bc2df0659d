//! Package loading, isolation and supervision for fleet health checks.
//!
//! The `fleet-packages` crate implements the execution core of the fleet
//! health-check system. Health checks are contributed by **packages**: named,
//! versioned units declaring one or more **checkers** in a `manifest.json`.
//!
//! Packages come in two flavours:
//!
//! - **Built-in** packages ship with the host. Their checkers implement the
//!   [`Checker`] trait and are registered ahead of time in a
//!   [`BuiltinCatalog`]; the manifest only selects which of them a package
//!   exposes. No code is ever loaded into the host process at runtime.
//! - **External** packages are installed separately and run in their own
//!   subprocess. A [`WorkerSupervisor`] owns that subprocess and talks to it
//!   with newline-delimited JSON-RPC over standard I/O, restarting it after
//!   crashes and polling it for health.
//!
//! # Architecture
//!
//! The [`PackageRegistry`] sits on top: it discovers package directories,
//! validates manifests (see [`manifest::validate`]), loads built-ins or
//! spawns workers, persists metadata through a [`PackageStore`] and routes
//! checker execution through the [`LicenseGate`]. Failures are contained to
//! the smallest unit that caused them: one package, one checker, or one
//! request.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fleet_packages::{
//!     BuiltinCatalog, InMemoryLicenseGate, InMemoryPackageStore, PackageCheckerContext,
//!     PackageRegistry, ProcessLauncher, RegistryOptions,
//! };
//!
//! # async fn demo() {
//! let registry = PackageRegistry::new(
//!     RegistryOptions::new("/usr/share/fleet/packages", "/var/lib/fleet/packages"),
//!     BuiltinCatalog::new(),
//!     Arc::new(InMemoryPackageStore::new()),
//!     Arc::new(InMemoryLicenseGate::new()),
//!     Arc::new(ProcessLauncher),
//! );
//!
//! registry.load_all().await;
//! let results = registry
//!     .run_all_checkers(&PackageCheckerContext::new("vm-42"))
//!     .await;
//! registry.shutdown().await;
//! # let _ = results;
//! # }
//! ```

pub mod capability;
pub mod checker;
pub mod context;
pub mod error;
pub mod manifest;
pub mod protocol;
pub mod registry;
pub mod store;
pub mod worker;

#[cfg(test)]
mod tests;

pub use self::capability::{
    CapabilityReview, InMemoryLicenseGate, LicenseGate, LicenseVerdict, describe_capabilities,
};
pub use self::checker::{BuiltinCatalog, Checker};
pub use self::context::{
    DiskMetric, MemoryMetrics, PackageCheckerContext, PackageCheckerResult, PortUsage,
    ProcessSnapshot, RemediationRef, Severity,
};
pub use self::error::{CheckerError, FieldError, ManifestErrors, PackageError, WorkerError};
pub use self::manifest::{
    CheckerDefinition, DataNeed, LicenseKind, PackageCapabilities, PackageManifest,
};
pub use self::registry::{
    LoadReport, PackageOrigin, PackageRegistry, PackageStatus, RegistryOptions, SkippedPackage,
};
pub use self::store::{InMemoryPackageStore, JsonFileStore, PackageRecord, PackageStore, StoreError};
pub use self::worker::{
    ProcessLauncher, WorkerEnd, WorkerLauncher, WorkerSettings, WorkerState, WorkerStats,
    WorkerSupervisor,
};
