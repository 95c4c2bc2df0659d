//! In-process checkers and the catalogue built-in packages draw them from.
//!
//! Built-in packages never load code by path. Instead the host registers
//! every first-party checker in a [`BuiltinCatalog`] at startup, keyed by the
//! owning package name and the `file` the manifest declares for it. When the
//! registry loads a built-in package it resolves each declared checker
//! against the catalogue; a declaration with no registered entry is skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{PackageCheckerContext, PackageCheckerResult};
use crate::error::CheckerError;

/// An analysis routine executed inside the host process.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use fleet_packages::{Checker, CheckerError, PackageCheckerContext, PackageCheckerResult};
///
/// struct AlwaysQuiet;
///
/// #[async_trait]
/// impl Checker for AlwaysQuiet {
///     async fn analyze(
///         &self,
///         _context: &PackageCheckerContext,
///     ) -> Result<Vec<PackageCheckerResult>, CheckerError> {
///         Ok(Vec::new())
///     }
/// }
/// ```
#[async_trait]
pub trait Checker: Send + Sync {
    /// Inspects the context and returns zero or more recommendations.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckerError`] when the analysis cannot be completed.
    async fn analyze(
        &self,
        context: &PackageCheckerContext,
    ) -> Result<Vec<PackageCheckerResult>, CheckerError>;
}

/// Startup-time registration table for built-in checkers.
#[derive(Clone, Default)]
pub struct BuiltinCatalog {
    entries: BTreeMap<(String, String), Arc<dyn Checker>>,
}

impl BuiltinCatalog {
    /// Creates an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `checker` under `package` and `file`, replacing any
    /// previous entry for the same key.
    pub fn register(
        &mut self,
        package: impl Into<String>,
        file: impl Into<String>,
        checker: Arc<dyn Checker>,
    ) {
        self.entries.insert((package.into(), file.into()), checker);
    }

    /// Builder-style variant of [`BuiltinCatalog::register`].
    #[must_use]
    pub fn with(
        mut self,
        package: impl Into<String>,
        file: impl Into<String>,
        checker: Arc<dyn Checker>,
    ) -> Self {
        self.register(package, file, checker);
        self
    }

    /// Looks up the checker registered for `package` and `file`.
    #[must_use]
    pub fn resolve(&self, package: &str, file: &str) -> Option<Arc<dyn Checker>> {
        self.entries
            .get(&(package.to_owned(), file.to_owned()))
            .cloned()
    }

    /// Returns the number of registered checkers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for BuiltinCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.keys().map(|(package, file)| format!("{package}/{file}")))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Severity;

    struct Fixed(&'static str);

    #[async_trait]
    impl Checker for Fixed {
        async fn analyze(
            &self,
            _context: &PackageCheckerContext,
        ) -> Result<Vec<PackageCheckerResult>, CheckerError> {
            Ok(vec![PackageCheckerResult::new(
                self.0,
                "found",
                "fix",
                Severity::Low,
            )])
        }
    }

    #[tokio::test]
    async fn resolves_by_package_and_file() {
        let catalog = BuiltinCatalog::new()
            .with("disk-health", "low-space.js", Arc::new(Fixed("disk")))
            .with("ports", "low-space.js", Arc::new(Fixed("ports")));

        let checker = catalog
            .resolve("disk-health", "low-space.js")
            .expect("registered");
        let results = checker
            .analyze(&PackageCheckerContext::new("vm"))
            .await
            .expect("analyze");
        assert_eq!(results.first().map(|r| r.kind.as_str()), Some("disk"));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn unknown_entries_resolve_to_none() {
        let catalog = BuiltinCatalog::new().with("disk-health", "a.js", Arc::new(Fixed("disk")));
        assert!(catalog.resolve("disk-health", "b.js").is_none());
        assert!(catalog.resolve("other", "a.js").is_none());
    }

    #[test]
    fn debug_lists_registered_keys() {
        let catalog = BuiltinCatalog::new().with("disk-health", "a.js", Arc::new(Fixed("disk")));
        assert_eq!(format!("{catalog:?}"), r#"["disk-health/a.js"]"#);
    }
}
