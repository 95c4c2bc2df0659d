//! First-party checkers compiled into the daemon.
//!
//! Each checker is registered in the [`BuiltinCatalog`] under the package
//! name and checker `file` its manifest in `packages/builtin/` declares.

mod disk;
mod ports;


use std::sync::Arc;

use fleet_packages::BuiltinCatalog;

pub use disk::LowSpace;
pub use ports::ExposedPorts;

/// Name of the built-in disk package.
pub const DISK_HEALTH_PACKAGE: &str = "disk-health";
/// Name of the built-in port package.
pub const PORT_EXPOSURE_PACKAGE: &str = "port-exposure";

/// Builds the catalogue of every first-party checker.
#[must_use]
pub fn first_party_catalog() -> BuiltinCatalog {
    BuiltinCatalog::new()
        .with(DISK_HEALTH_PACKAGE, "low-space", Arc::new(LowSpace))
        .with(PORT_EXPOSURE_PACKAGE, "exposed-ports", Arc::new(ExposedPorts))
}
