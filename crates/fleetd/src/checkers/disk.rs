use async_trait::async_trait;
use serde_json::{Map, json};

use fleet_packages::{
    Checker, CheckerError, PackageCheckerContext, PackageCheckerResult, RemediationRef, Severity,
};

const WARNING_KEY: &str = "warningPercent";
const CRITICAL_KEY: &str = "criticalPercent";
const DEFAULT_WARNING: u64 = 85;
const DEFAULT_CRITICAL: u64 = 95;

/// Flags filesystems whose usage crosses the configured thresholds.
///
/// Usage at or above `warningPercent` is reported as high severity; at or
/// above `criticalPercent` it is critical and offers the `prune-logs`
/// remediation. A context without disk metrics yields nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LowSpace;

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    warning: u64,
    critical: u64,
}

impl Thresholds {
    fn from_context(context: &PackageCheckerContext) -> Result<Self, CheckerError> {
        let warning = context.setting_u64(WARNING_KEY).unwrap_or(DEFAULT_WARNING);
        let critical = context.setting_u64(CRITICAL_KEY).unwrap_or(DEFAULT_CRITICAL);
        if critical > 100 || warning > critical {
            return Err(CheckerError::new(format!(
                "invalid thresholds: warning {warning}% must not exceed critical {critical}% (max 100%)"
            )));
        }
        Ok(Self { warning, critical })
    }

    const fn severity(self, used_percent: u64) -> Option<Severity> {
        if used_percent >= self.critical {
            Some(Severity::Critical)
        } else if used_percent >= self.warning {
            Some(Severity::High)
        } else {
            None
        }
    }
}

#[async_trait]
impl Checker for LowSpace {
    async fn analyze(
        &self,
        context: &PackageCheckerContext,
    ) -> Result<Vec<PackageCheckerResult>, CheckerError> {
        let Some(metrics) = context.disk_metrics.as_deref() else {
            return Ok(Vec::new());
        };
        let thresholds = Thresholds::from_context(context)?;

        let results = metrics
            .iter()
            .filter_map(|metric| {
                let used = metric.used_percent();
                let severity = thresholds.severity(used)?;
                let finding = PackageCheckerResult::new(
                    "disk",
                    format!("Filesystem {} is {used}% full", metric.mount_point),
                    "Free space or grow the volume",
                    severity,
                )
                .with_data(json!({
                    "mountPoint": metric.mount_point,
                    "usedPercent": used,
                    "availableBytes": metric.total_bytes.saturating_sub(metric.used_bytes),
                }));
                Some(if severity == Severity::Critical {
                    let mut params = Map::new();
                    params.insert("mountPoint".to_owned(), json!(metric.mount_point));
                    finding.with_remediation(RemediationRef {
                        name: "prune-logs".to_owned(),
                        params,
                    })
                } else {
                    finding
                })
            })
            .collect();
        Ok(results)
    }
}
