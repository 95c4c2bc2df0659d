//! Crate-level integration and BDD tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::capability::InMemoryLicenseGate;
use crate::checker::{BuiltinCatalog, Checker};
use crate::context::{PackageCheckerContext, PackageCheckerResult, Severity};
use crate::error::CheckerError;
use crate::registry::{PackageRegistry, RegistryOptions};
use crate::store::InMemoryPackageStore;
use crate::worker::test_support::FakeLauncher;


/// Built-in checker reporting a single finding tagged with its kind.
pub(crate) struct Finding(pub(crate) &'static str);

#[async_trait]
impl Checker for Finding {
    async fn analyze(
        &self,
        _context: &PackageCheckerContext,
    ) -> Result<Vec<PackageCheckerResult>, CheckerError> {
        Ok(vec![PackageCheckerResult::new(
            self.0,
            "finding",
            "look into it",
            Severity::Low,
        )])
    }
}

/// Built-in checker that always fails.
pub(crate) struct Broken;

#[async_trait]
impl Checker for Broken {
    async fn analyze(
        &self,
        _context: &PackageCheckerContext,
    ) -> Result<Vec<PackageCheckerResult>, CheckerError> {
        Err(CheckerError::new("metrics source unavailable"))
    }
}

#[tokio::test]
async fn end_to_end_builtin_package() {
    let root = tempfile::tempdir().expect("tempdir");
    let package = root.path().join("builtin").join("disk");
    std::fs::create_dir_all(&package).expect("mkdir");
    std::fs::write(
        package.join("manifest.json"),
        json!({
            "name": "disk-check",
            "version": "1.0.0",
            "displayName": "Disk Check",
            "author": "acme",
            "license": "open-source",
            "checkers": [{"name": "low-space", "file": "check.js", "type": "disk"}]
        })
        .to_string(),
    )
    .expect("write manifest");
    let (launcher, _workers) = FakeLauncher::ready();
    let registry = PackageRegistry::new(
        RegistryOptions::new(root.path().join("builtin"), root.path().join("external")),
        BuiltinCatalog::new().with("disk-check", "check.js", Arc::new(Finding("disk"))),
        Arc::new(InMemoryPackageStore::new()),
        Arc::new(InMemoryLicenseGate::new()),
        launcher,
    );

    let report = registry.load_all().await;
    let results = registry
        .run_all_checkers(&PackageCheckerContext::new("vm-42"))
        .await;

    assert!(report.is_clean());
    assert_eq!(results.len(), 1);
    assert_eq!(results.first().map(|r| r.kind.as_str()), Some("disk"));
    registry.shutdown().await;
}
