//! Capability review and license gating for packages.
//!
//! Packages declare the resources they want at install time: network
//! domains, persistent storage, a cron schedule and the right to execute
//! remediations. [`describe_capabilities`] renders those requests for an
//! administrator and raises advisory warnings. Nothing here blocks loading.
//!
//! Commercial external packages must additionally hold a valid license
//! before any of their checkers run. The registry asks a [`LicenseGate`]
//! for a [`LicenseVerdict`] on every execution; see [`requires_license`].

mod license;


use crate::manifest::{LicenseKind, PackageCapabilities, PackageManifest};

pub use self::license::{InMemoryLicenseGate, LicenseGate, LicenseVerdict};

#[cfg(test)]
pub use self::license::MockLicenseGate;

/// Number of whitespace-separated fields in a standard cron expression.
const CRON_FIELDS: usize = 5;

/// Human-readable summary of a package's capability requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityReview {
    lines: Vec<String>,
    warnings: Vec<String>,
}

impl CapabilityReview {
    /// Returns one line per requested capability.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns advisory warnings raised while reviewing the request.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns `true` when the package requests nothing beyond analysis.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Renders the capability request for installation-time review.
///
/// # Example
///
/// ```
/// use fleet_packages::{PackageCapabilities, describe_capabilities};
///
/// let capabilities = PackageCapabilities {
///     network: vec![String::from("*.acme.io")],
///     ..PackageCapabilities::default()
/// };
/// let review = describe_capabilities(Some(&capabilities));
/// assert_eq!(review.lines(), ["Network access to: *.acme.io"]);
/// assert_eq!(review.warnings().len(), 1);
/// ```
#[must_use]
pub fn describe_capabilities(capabilities: Option<&PackageCapabilities>) -> CapabilityReview {
    let mut review = CapabilityReview::default();
    let Some(capabilities) = capabilities else {
        return review;
    };

    if !capabilities.network.is_empty() {
        review.lines.push(format!(
            "Network access to: {}",
            capabilities.network.join(", ")
        ));
        for domain in capabilities.network.iter().filter(|d| d.contains('*')) {
            review
                .warnings
                .push(format!("wildcard network domain '{domain}' grants broad access"));
        }
    }

    if capabilities.storage {
        review.lines.push(String::from("Persistent local storage"));
        review
            .warnings
            .push(String::from("package keeps state between runs"));
    }

    if let Some(cron) = capabilities.cron.as_deref() {
        review.lines.push(format!("Scheduled runs: {cron}"));
        if cron.split_whitespace().count() != CRON_FIELDS {
            review.warnings.push(format!(
                "cron expression '{cron}' does not have {CRON_FIELDS} fields"
            ));
        }
    }

    if capabilities.remediation {
        review
            .lines
            .push(String::from("Execute remediations on managed VMs"));
        review
            .warnings
            .push(String::from("package may change VM state when remediating"));
    }

    review
}

/// Returns `true` when executing the package's checkers needs a license.
///
/// Only external commercial packages are gated; built-ins ship with the
/// host and open-source packages are always allowed.
#[must_use]
pub fn requires_license(manifest: &PackageManifest, built_in: bool) -> bool {
    !built_in && manifest.license() == LicenseKind::Commercial
}
