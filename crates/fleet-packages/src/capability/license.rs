//! License gate interface and an in-memory implementation.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use time::OffsetDateTime;

/// Outcome of a license check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseVerdict {
    valid: bool,
    reason: Option<String>,
}

impl LicenseVerdict {
    /// A verdict allowing execution.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    /// A verdict refusing execution for `reason`.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }

    /// Returns `true` when execution is allowed.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Returns why execution was refused.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Answers whether a package may run right now.
///
/// Implementations report problems through the verdict; the check itself
/// cannot fail.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LicenseGate: Send + Sync {
    /// Validates the license held for `package`.
    async fn validate(&self, package: &str) -> LicenseVerdict;
}

/// License gate backed by an in-memory grant table.
///
/// # Example
///
/// ```
/// use fleet_packages::{InMemoryLicenseGate, LicenseGate};
///
/// # async fn demo() {
/// let gate = InMemoryLicenseGate::new();
/// gate.grant("acme-db", None);
/// assert!(gate.validate("acme-db").await.is_valid());
/// assert!(!gate.validate("other").await.is_valid());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryLicenseGate {
    grants: RwLock<HashMap<String, Option<OffsetDateTime>>>,
}

impl InMemoryLicenseGate {
    /// Creates a gate with no grants.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gate granting perpetual licenses to `packages`.
    #[must_use]
    pub fn with_perpetual<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let grants = packages
            .into_iter()
            .map(|name| (name.into(), None))
            .collect();
        Self {
            grants: RwLock::new(grants),
        }
    }

    /// Grants a license to `package`, expiring at `expires_at` when given.
    pub fn grant(&self, package: impl Into<String>, expires_at: Option<OffsetDateTime>) {
        self.grants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(package.into(), expires_at);
    }

    /// Removes any license held by `package`.
    pub fn revoke(&self, package: &str) {
        self.grants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(package);
    }

    pub(crate) fn verdict_at(&self, package: &str, now: OffsetDateTime) -> LicenseVerdict {
        let grants = self.grants.read().unwrap_or_else(PoisonError::into_inner);
        match grants.get(package) {
            None => LicenseVerdict::invalid(format!("no license held for '{package}'")),
            Some(Some(expiry)) if *expiry <= now => {
                LicenseVerdict::invalid(format!("license for '{package}' expired at {expiry}"))
            }
            Some(_) => LicenseVerdict::valid(),
        }
    }
}

#[async_trait]
impl LicenseGate for InMemoryLicenseGate {
    async fn validate(&self, package: &str) -> LicenseVerdict {
        self.verdict_at(package, OffsetDateTime::now_utc())
    }
}
