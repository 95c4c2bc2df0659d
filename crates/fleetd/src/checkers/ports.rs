use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::{Value, json};

use fleet_packages::{
    Checker, CheckerError, PackageCheckerContext, PackageCheckerResult, PortUsage, Severity,
};

const ALLOWED_KEY: &str = "allowedPorts";
const DEFAULT_ALLOWED: &str = "22,80,443";

/// Data stores that should never listen on a public interface.
const DATA_STORE_PORTS: [u16; 6] = [3306, 5432, 6379, 9200, 11211, 27017];

/// Reports sockets bound to every interface on ports outside the allow list.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExposedPorts;

fn allowed_ports(context: &PackageCheckerContext) -> Result<BTreeSet<u16>, CheckerError> {
    let raw = context
        .settings
        .get(ALLOWED_KEY)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ALLOWED);
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<u16>()
                .map_err(|_| CheckerError::new(format!("'{entry}' in {ALLOWED_KEY} is not a port")))
        })
        .collect()
}

fn finding(usage: &PortUsage) -> PackageCheckerResult {
    let severity = if DATA_STORE_PORTS.contains(&usage.port) {
        Severity::High
    } else {
        Severity::Medium
    };
    let owner = usage.process.as_deref().unwrap_or("an unknown process");
    PackageCheckerResult::new(
        "security",
        format!(
            "Port {}/{} is open on all interfaces ({owner})",
            usage.port, usage.protocol
        ),
        "Bind the service to a private address or firewall the port",
        severity,
    )
    .with_data(json!({
        "port": usage.port,
        "protocol": usage.protocol,
        "bindAddress": usage.bind_address,
    }))
}

#[async_trait]
impl Checker for ExposedPorts {
    async fn analyze(
        &self,
        context: &PackageCheckerContext,
    ) -> Result<Vec<PackageCheckerResult>, CheckerError> {
        let Some(ports) = context.port_usage.as_deref() else {
            return Ok(Vec::new());
        };
        let allowed = allowed_ports(context)?;
        Ok(ports
            .iter()
            .filter(|usage| usage.is_exposed() && !allowed.contains(&usage.port))
            .map(finding)
            .collect())
    }
}
