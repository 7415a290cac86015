//! Health and status reporting
//!
//! Built from the registry and the connector set at startup; never calls a
//! backend. The same report backs `GET /health` and the `gateway_status`
//! tool.

use crate::registry::ToolRegistry;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use sm_backends::{Arguments, BackendConnector, BackendError, ConnectorSet};
use sm_core::{BackendKind, GATEWAY_NAME, GATEWAY_VERSION};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub configured: bool,
    pub service: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub backends: BTreeMap<BackendKind, BackendStatus>,
    pub registry_size: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone)]
pub struct HealthReporter {
    started: Instant,
    registry: Arc<ToolRegistry>,
    backends: BTreeMap<BackendKind, bool>,
}

impl HealthReporter {
    pub fn new(registry: Arc<ToolRegistry>, connectors: &ConnectorSet) -> Self {
        Self {
            started: Instant::now(),
            registry,
            backends: connectors.configured(),
        }
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            backends: self
                .backends
                .iter()
                .map(|(kind, configured)| {
                    (
                        *kind,
                        BackendStatus {
                            configured: *configured,
                            service: kind.service(),
                        },
                    )
                })
                .collect(),
            registry_size: self.registry.len(),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }

    /// Status plus identity and catalog, as returned by `gateway_status`
    pub fn detailed(&self) -> Value {
        json!({
            "gateway": GATEWAY_NAME,
            "version": GATEWAY_VERSION,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "health": self.status(),
            "tools": self.registry.names(),
        })
    }
}

/// Connector behind the `gateway_status` tool
pub struct StatusConnector {
    reporter: HealthReporter,
}

impl StatusConnector {
    pub fn new(reporter: HealthReporter) -> Self {
        Self { reporter }
    }
}

#[async_trait]
impl BackendConnector for StatusConnector {
    fn kind(&self) -> BackendKind {
        BackendKind::Gateway
    }

    async fn invoke(&self, operation: &str, _args: &Arguments) -> Result<Value, BackendError> {
        match operation {
            "status" => Ok(self.reporter.detailed()),
            other => Err(BackendError::unsupported(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_registry;
    use sm_backends::DisabledConnector;

    #[tokio::test]
    async fn test_status_reports_configuration_without_calls() {
        let connectors = ConnectorSet::new()
            .with(Arc::new(DisabledConnector::missing(
                BackendKind::Voice,
                &["ELEVENLABS_API_KEY"],
            )));
        let reporter = HealthReporter::new(Arc::new(builtin_registry().unwrap()), &connectors);

        let status = serde_json::to_value(reporter.status()).unwrap();
        assert_eq!(status["status"], "ok");
        assert_eq!(status["registry_size"], 16);
        assert_eq!(status["backends"]["voice"]["configured"], false);
        assert_eq!(status["backends"]["voice"]["service"], "elevenlabs");

        let detailed = StatusConnector::new(reporter)
            .invoke("status", &Arguments::new())
            .await
            .unwrap();
        assert_eq!(detailed["gateway"], GATEWAY_NAME);
        assert_eq!(detailed["tools"].as_array().unwrap().len(), 16);
    }
}
