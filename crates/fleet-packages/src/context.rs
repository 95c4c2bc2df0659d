//! Typed analysis context handed to checkers and the results they return.
//!
//! Each known data need maps to one optional, strongly typed field so that
//! context crossing the worker boundary is deserialised and checked once,
//! at the edge. Package-specific settings are the only untyped part.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Usage figures for one mounted filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskMetric {
    /// Mount point, for example `/var`.
    pub mount_point: String,
    /// Total capacity in bytes.
    pub total_bytes: u64,
    /// Bytes currently in use.
    pub used_bytes: u64,
}

impl DiskMetric {
    /// Returns the used share of the filesystem as a whole percentage.
    ///
    /// A filesystem reporting zero capacity is treated as empty.
    #[must_use]
    pub fn used_percent(&self) -> u64 {
        self.used_bytes
            .saturating_mul(100)
            .checked_div(self.total_bytes)
            .unwrap_or(0)
    }
}

/// One running process observed on the VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    /// Process identifier.
    pub pid: u32,
    /// Executable name.
    pub name: String,
    /// Resident memory in bytes.
    #[serde(default)]
    pub resident_bytes: u64,
    /// CPU usage in hundredths of a percent.
    #[serde(default)]
    pub cpu_centi_percent: u32,
}

/// One listening socket observed on the VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortUsage {
    /// Port number.
    pub port: u16,
    /// Transport protocol, `tcp` or `udp`.
    pub protocol: String,
    /// Address the socket is bound to.
    pub bind_address: String,
    /// Owning process, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
}

impl PortUsage {
    /// Returns `true` when the socket accepts connections from any address.
    #[must_use]
    pub fn is_exposed(&self) -> bool {
        matches!(self.bind_address.as_str(), "0.0.0.0" | "::" | "*")
    }
}

/// Memory and swap usage of the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetrics {
    /// Total memory in bytes.
    pub total_bytes: u64,
    /// Memory available for new allocations in bytes.
    pub available_bytes: u64,
    /// Total swap in bytes.
    #[serde(default)]
    pub swap_total_bytes: u64,
    /// Swap in use in bytes.
    #[serde(default)]
    pub swap_used_bytes: u64,
}

impl MemoryMetrics {
    /// Returns the used share of memory as a whole percentage.
    #[must_use]
    pub fn used_percent(&self) -> u64 {
        self.total_bytes
            .saturating_sub(self.available_bytes)
            .saturating_mul(100)
            .checked_div(self.total_bytes)
            .unwrap_or(0)
    }
}

/// Input to a single checker run.
///
/// # Example
///
/// ```
/// use fleet_packages::PackageCheckerContext;
/// use serde_json::{Map, json};
///
/// let mut persisted = Map::new();
/// persisted.insert("threshold".into(), json!(80));
///
/// let context = PackageCheckerContext::new("vm-7").with_settings(&persisted);
/// assert_eq!(context.settings.get("threshold"), Some(&json!(80)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCheckerContext {
    /// Identifier of the VM under analysis.
    pub vm_id: String,
    /// Per-filesystem disk usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_metrics: Option<Vec<DiskMetric>>,
    /// Running processes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_snapshots: Option<Vec<ProcessSnapshot>>,
    /// Listening sockets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_usage: Option<Vec<PortUsage>>,
    /// Memory and swap usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_metrics: Option<MemoryMetrics>,
    /// Package settings in effect for this run.
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl PackageCheckerContext {
    /// Creates an empty context for the given VM.
    #[must_use]
    pub fn new(vm_id: impl Into<String>) -> Self {
        Self {
            vm_id: vm_id.into(),
            ..Self::default()
        }
    }

    /// Returns a copy with `persisted` laid over the caller's settings.
    ///
    /// Persisted keys win over keys the caller already supplied.
    #[must_use]
    pub fn with_settings(&self, persisted: &Map<String, Value>) -> Self {
        let mut merged = self.clone();
        for (key, value) in persisted {
            merged.settings.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Returns a numeric setting, if present and numeric.
    #[must_use]
    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        self.settings.get(key).and_then(Value::as_u64)
    }
}

/// How urgent a recommendation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational only.
    Info,
    /// Worth looking at eventually.
    Low,
    /// Should be addressed soon.
    Medium,
    /// Needs attention.
    High,
    /// Service-affecting.
    Critical,
}

/// Pointer to a remediation a result suggests running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationRef {
    /// Remediation name as declared in the package manifest.
    pub name: String,
    /// Parameters to pass to the remediation.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

/// One recommendation produced by a checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCheckerResult {
    /// Recommendation category tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable finding.
    pub text: String,
    /// Suggested action.
    pub action: String,
    /// Urgency.
    pub severity: Severity,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Optional remediation to offer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationRef>,
}

impl PackageCheckerResult {
    /// Creates a result without structured data or remediation.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        text: impl Into<String>,
        action: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
            action: action.into(),
            severity,
            data: None,
            remediation: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attaches a remediation reference.
    #[must_use]
    pub fn with_remediation(mut self, remediation: RemediationRef) -> Self {
        self.remediation = Some(remediation);
        self
    }
}
