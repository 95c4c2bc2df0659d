//! The memory-pressure checker behind `fleet-sample-worker`.
//!
//! Besides serving as an example package, the sample can misbehave on
//! request so supervision can be exercised against a real process. The
//! switches are read from `FLEET_SAMPLE_*` environment variables.

use std::thread;
use std::time::Duration;

use serde_json::{Map, Value, json};

use fleet_packages::protocol::{AnalyzeParams, AnalyzeResult, ConfigureParams, HealthResult};
use fleet_packages::{PackageCheckerContext, PackageCheckerResult, Severity};

use crate::error::HandlerError;
use crate::serve::WorkerHandler;

/// Name of the only checker the sample provides.
pub const CHECKER_NAME: &str = "memory-pressure";
/// Setting holding the usage threshold in percent.
pub const THRESHOLD_SETTING: &str = "memoryThresholdPercent";
/// Threshold applied when no setting is present.
pub const DEFAULT_THRESHOLD: u64 = 90;

/// Delays every `analyze` answer by this many milliseconds.
pub const ENV_ANALYZE_DELAY_MS: &str = "FLEET_SAMPLE_ANALYZE_DELAY_MS";
/// Reports unhealthy on every health check when set to `1`.
pub const ENV_UNHEALTHY: &str = "FLEET_SAMPLE_UNHEALTHY";
/// Exits with status 3 on the first `analyze` when set to `1`.
pub const ENV_CRASH_ON_ANALYZE: &str = "FLEET_SAMPLE_CRASH_ON_ANALYZE";
/// Never announces readiness when set to `1`.
pub const ENV_SILENT: &str = "FLEET_SAMPLE_SILENT";

/// Misbehaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleOptions {
    /// Delay before answering `analyze`.
    pub analyze_delay: Duration,
    /// Report unhealthy on every health check.
    pub unhealthy: bool,
    /// Exit instead of answering `analyze`.
    pub crash_on_analyze: bool,
    /// Never announce readiness.
    pub silent: bool,
}

impl SampleOptions {
    /// Reads the switches through `lookup`, normally [`std::env::var`].
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).is_some_and(|value| value.trim() == "1");
        let delay_ms = lookup(ENV_ANALYZE_DELAY_MS)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(0);
        Self {
            analyze_delay: Duration::from_millis(delay_ms),
            unhealthy: flag(ENV_UNHEALTHY),
            crash_on_analyze: flag(ENV_CRASH_ON_ANALYZE),
            silent: flag(ENV_SILENT),
        }
    }

    /// Reads the switches from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Flags VMs whose memory usage crosses the configured threshold.
#[derive(Debug, Default)]
pub struct MemoryPressure {
    options: SampleOptions,
    settings: Map<String, Value>,
}

impl MemoryPressure {
    /// Creates the handler with the given switches.
    #[must_use]
    pub fn new(options: SampleOptions) -> Self {
        Self {
            options,
            settings: Map::new(),
        }
    }

    fn threshold(&self, context: &PackageCheckerContext) -> Result<u64, HandlerError> {
        let configured = context
            .settings
            .get(THRESHOLD_SETTING)
            .or_else(|| self.settings.get(THRESHOLD_SETTING));
        configured.map_or(Ok(DEFAULT_THRESHOLD), |value| {
            value
                .as_u64()
                .filter(|percent| *percent <= 100)
                .ok_or_else(|| {
                    HandlerError::invalid_params(format!(
                        "{THRESHOLD_SETTING} must be a percentage, got {value}"
                    ))
                })
        })
    }

    fn evaluate(
        &self,
        context: &PackageCheckerContext,
    ) -> Result<Vec<PackageCheckerResult>, HandlerError> {
        let Some(memory) = context.memory_metrics else {
            return Ok(Vec::new());
        };
        let threshold = self.threshold(context)?;
        let used = memory.used_percent();
        if used < threshold {
            return Ok(Vec::new());
        }
        let heaviest = context
            .process_snapshots
            .as_deref()
            .and_then(|processes| processes.iter().max_by_key(|process| process.resident_bytes))
            .map(|process| process.name.clone());
        let severity = if used >= 98 { Severity::Critical } else { Severity::High };
        Ok(vec![
            PackageCheckerResult::new(
                "memory",
                format!("Memory usage is at {used}%"),
                "Restart or resize the heaviest workload",
                severity,
            )
            .with_data(json!({
                "usedPercent": used,
                "thresholdPercent": threshold,
                "heaviestProcess": heaviest,
            })),
        ])
    }
}

impl WorkerHandler for MemoryPressure {
    fn analyze(&mut self, params: AnalyzeParams) -> Result<AnalyzeResult, HandlerError> {
        if self.options.crash_on_analyze {
            tracing::error!(target: "fleet_worker_sdk::sample", "crashing on request");
            std::process::exit(3);
        }
        if !self.options.analyze_delay.is_zero() {
            thread::sleep(self.options.analyze_delay);
        }
        if let Some(checker) = params.checker.as_deref().filter(|name| *name != CHECKER_NAME) {
            return Err(HandlerError::invalid_params(format!(
                "unknown checker '{checker}'"
            )));
        }
        Ok(AnalyzeResult {
            recommendations: self.evaluate(&params.context)?,
        })
    }

    fn configure(&mut self, params: ConfigureParams) -> Result<(), HandlerError> {
        self.settings = params.settings;
        Ok(())
    }

    fn health(&mut self) -> HealthResult {
        HealthResult {
            healthy: !self.options.unhealthy,
        }
    }
}
