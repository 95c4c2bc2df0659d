//! Package manifest types describing identity, checkers and capabilities.
//!
//! A [`PackageManifest`] is the parsed form of a package's `manifest.json`.
//! Manifests are only ever produced by [`validate`] or [`validate_str`], which
//! check the raw JSON against the manifest grammar and report every violation
//! at once. A value of this type is therefore always well formed.

mod validate;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use self::validate::{validate, validate_str};

/// File name of the manifest inside every package directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Entrypoint spawned for external packages that do not declare one.
pub const DEFAULT_ENTRYPOINT: &str = "worker";

/// Licensing model declared by a package.
///
/// # Example
///
/// ```
/// use fleet_packages::LicenseKind;
///
/// assert_eq!(LicenseKind::OpenSource.as_str(), "open-source");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LicenseKind {
    /// Freely usable; never gated.
    OpenSource,
    /// Requires a valid license before external checkers may run.
    Commercial,
}

impl LicenseKind {
    /// Returns the canonical manifest spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenSource => "open-source",
            Self::Commercial => "commercial",
        }
    }

    /// Parses the manifest spelling.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open-source" => Some(Self::OpenSource),
            "commercial" => Some(Self::Commercial),
            _ => None,
        }
    }
}

impl std::fmt::Display for LicenseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context field a checker consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataNeed {
    /// Per-filesystem disk usage.
    DiskMetrics,
    /// Running process list.
    ProcessSnapshots,
    /// Listening sockets.
    PortUsage,
    /// Memory and swap usage.
    MemoryMetrics,
}

impl DataNeed {
    /// Every known data need, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::DiskMetrics,
        Self::ProcessSnapshots,
        Self::PortUsage,
        Self::MemoryMetrics,
    ];

    /// Returns the manifest spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DiskMetrics => "diskMetrics",
            Self::ProcessSnapshots => "processSnapshots",
            Self::PortUsage => "portUsage",
            Self::MemoryMetrics => "memoryMetrics",
        }
    }

    /// Parses the manifest spelling.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|need| need.as_str() == value)
    }
}

/// One analysis routine declared by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckerDefinition {
    name: String,
    file: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data_needs: Vec<DataNeed>,
}

impl CheckerDefinition {
    /// Returns the checker name, unique within its package.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the file the checker is registered under.
    #[must_use]
    pub const fn file(&self) -> &str {
        self.file.as_str()
    }

    /// Returns the recommendation category tag.
    #[must_use]
    pub const fn kind(&self) -> &str {
        self.kind.as_str()
    }

    /// Returns the context fields the checker consumes.
    #[must_use]
    pub fn data_needs(&self) -> &[DataNeed] {
        &self.data_needs
    }
}

/// A remediation routine a package offers alongside its checkers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationDefinition {
    name: String,
    file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl RemediationDefinition {
    /// Returns the remediation name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the file the remediation lives in.
    #[must_use]
    pub const fn file(&self) -> &str {
        self.file.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Resources and permissions a package requests at install time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCapabilities {
    /// Domains the package may contact.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network: Vec<String>,
    /// Whether the package keeps persistent local state.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub storage: bool,
    /// Cron expression for scheduled runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// Whether the package may execute remediations on managed VMs.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub remediation: bool,
}

/// Value type of an admin-configurable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    /// Free text.
    String,
    /// Numeric value.
    Number,
    /// On/off flag.
    Boolean,
    /// One of a fixed list of options.
    Select,
}

impl SettingType {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "select" => Some(Self::Select),
            _ => None,
        }
    }
}

/// Schema entry for one package setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingDefinition {
    #[serde(rename = "type")]
    kind: SettingType,
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    options: Vec<String>,
}

impl SettingDefinition {
    /// Returns the value type.
    #[must_use]
    pub const fn kind(&self) -> SettingType {
        self.kind
    }

    /// Returns the label shown to administrators.
    #[must_use]
    pub const fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Returns the default value, if any.
    #[must_use]
    pub const fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns the allowed options of a `select` setting.
    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }
}

/// Declarative description of a package.
///
/// # Example
///
/// ```
/// use fleet_packages::manifest::validate_str;
///
/// let manifest = validate_str(r#"{
///     "name": "disk-check",
///     "version": "1.0.0",
///     "displayName": "Disk Check",
///     "author": "acme",
///     "license": "open-source",
///     "checkers": [{"name": "low-space", "file": "check.js", "type": "disk"}]
/// }"#).expect("valid manifest");
///
/// assert_eq!(manifest.name(), "disk-check");
/// assert_eq!(manifest.checkers().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    name: String,
    version: String,
    display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    author: String,
    license: LicenseKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_platform_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entrypoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capabilities: Option<PackageCapabilities>,
    checkers: Vec<CheckerDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    remediations: Vec<RemediationDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    settings: BTreeMap<String, SettingDefinition>,
}

impl PackageManifest {
    /// Returns the unique package name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the package version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the human-readable name.
    #[must_use]
    pub const fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the package author.
    #[must_use]
    pub const fn author(&self) -> &str {
        self.author.as_str()
    }

    /// Returns the licensing model.
    #[must_use]
    pub const fn license(&self) -> LicenseKind {
        self.license
    }

    /// Returns the minimum host platform version, if declared.
    #[must_use]
    pub fn min_platform_version(&self) -> Option<&str> {
        self.min_platform_version.as_deref()
    }

    /// Returns the worker entrypoint relative to the package directory.
    #[must_use]
    pub fn entrypoint(&self) -> &str {
        self.entrypoint.as_deref().unwrap_or(DEFAULT_ENTRYPOINT)
    }

    /// Returns the requested capabilities, if declared.
    #[must_use]
    pub const fn capabilities(&self) -> Option<&PackageCapabilities> {
        self.capabilities.as_ref()
    }

    /// Returns the declared checkers.
    #[must_use]
    pub fn checkers(&self) -> &[CheckerDefinition] {
        &self.checkers
    }

    /// Looks up a checker by name.
    #[must_use]
    pub fn checker(&self, name: &str) -> Option<&CheckerDefinition> {
        self.checkers.iter().find(|checker| checker.name == name)
    }

    /// Returns the declared remediations.
    #[must_use]
    pub fn remediations(&self) -> &[RemediationDefinition] {
        &self.remediations
    }

    /// Returns the settings schema.
    #[must_use]
    pub const fn settings(&self) -> &BTreeMap<String, SettingDefinition> {
        &self.settings
    }

    /// Collects the declared setting defaults into a settings map.
    #[must_use]
    pub fn default_settings(&self) -> serde_json::Map<String, Value> {
        self.settings
            .iter()
            .filter_map(|(key, definition)| {
                definition
                    .default_value()
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect()
    }

    /// Returns the declared minimum platform version when `host_version` is
    /// older than it.
    ///
    /// Versions compare numerically component by component. A host version
    /// that does not parse is treated as satisfying every requirement.
    #[must_use]
    pub fn requires_newer_platform(&self, host_version: &str) -> Option<&str> {
        let required = self.min_platform_version.as_deref()?;
        let required_parts = parse_version(required)?;
        let host_parts = parse_version(host_version)?;
        (host_parts < required_parts).then_some(required)
    }
}

/// Parses an `x.y.z` version into its numeric components.
pub(crate) fn parse_version(value: &str) -> Option<(u64, u64, u64)> {
    let core = value.split(['-', '+']).next().unwrap_or(value);
    let mut parts = core.split('.');
    let major = parse_component(parts.next()?)?;
    let minor = parse_component(parts.next()?)?;
    let patch = parse_component(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

fn parse_component(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

#[cfg(test)]
mod tests;
