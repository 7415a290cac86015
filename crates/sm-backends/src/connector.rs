//! Backend connector capability and the per-process connector set

use crate::args::Arguments;
use crate::automation::AutomationConnector;
use crate::error::BackendError;
use crate::shared_memory::SharedMemoryConnector;
use crate::source_host::SourceHostConnector;
use crate::task_tracker::TaskTrackerConnector;
use crate::voice::VoiceConnector;
use crate::warehouse::WarehouseConnector;
use async_trait::async_trait;
use serde_json::Value;
use sm_core::{BackendKind, GatewayConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One backend service behind the gateway.
///
/// Implementations own their credentials and hold no mutable state, so a
/// single instance serves every concurrent call.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// False for connectors built without their required credentials
    fn is_configured(&self) -> bool {
        true
    }

    /// Run `operation` with `args` against the backend.
    async fn invoke(&self, operation: &str, args: &Arguments) -> Result<Value, BackendError>;
}

pub type BoxedConnector = Arc<dyn BackendConnector>;

/// Stand-in for a backend that is missing credentials.
///
/// Every invoke fails with `NotConfigured` without touching the network.
#[derive(Debug, Clone)]
pub struct DisabledConnector {
    kind: BackendKind,
    reason: String,
}

impl DisabledConnector {
    pub fn new(kind: BackendKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Disabled because the named settings are absent
    pub fn missing(kind: BackendKind, settings: &[&str]) -> Self {
        Self::new(
            kind,
            format!("{} is not configured (missing {})", kind.service(), settings.join(", ")),
        )
    }
}

#[async_trait]
impl BackendConnector for DisabledConnector {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn invoke(&self, _operation: &str, _args: &Arguments) -> Result<Value, BackendError> {
        Err(BackendError::not_configured(self.reason.clone()))
    }
}

/// Exactly one connector per backend kind
#[derive(Clone, Default)]
pub struct ConnectorSet {
    connectors: BTreeMap<BackendKind, BoxedConnector>,
}

impl ConnectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every backend connector from configuration.
    ///
    /// Backends lacking credentials (or whose credentials cannot be turned
    /// into a client) get a [`DisabledConnector`]. The gateway's own status
    /// connector is added by the caller.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut set = Self::new();

        let warehouse = config
            .warehouse
            .as_ref()
            .map(|creds| WarehouseConnector::new(creds.clone()).map(Arc::new));

        set.insert_or_disable(config, BackendKind::Warehouse, || {
            warehouse.clone().map(|r| r.map(|w| w as BoxedConnector))
        });
        set.insert_or_disable(config, BackendKind::SharedMemory, || {
            warehouse.clone().map(|r| {
                r.and_then(|w| SharedMemoryConnector::new(w, &config.shared_memory.table))
                    .map(|c| Arc::new(c) as BoxedConnector)
            })
        });
        set.insert_or_disable(config, BackendKind::TaskTracker, || {
            config.task_tracker.as_ref().map(|creds| {
                TaskTrackerConnector::new(creds.clone()).map(|c| Arc::new(c) as BoxedConnector)
            })
        });
        set.insert_or_disable(config, BackendKind::Automation, || {
            config.automation.as_ref().map(|creds| {
                AutomationConnector::new(creds.clone()).map(|c| Arc::new(c) as BoxedConnector)
            })
        });
        set.insert_or_disable(config, BackendKind::SourceHost, || {
            config.source_host.as_ref().map(|creds| {
                SourceHostConnector::new(creds.clone()).map(|c| Arc::new(c) as BoxedConnector)
            })
        });
        set.insert_or_disable(config, BackendKind::Voice, || {
            config.voice.as_ref().map(|creds| {
                VoiceConnector::new(creds.clone()).map(|c| Arc::new(c) as BoxedConnector)
            })
        });

        set
    }

    fn insert_or_disable<F>(&mut self, config: &GatewayConfig, kind: BackendKind, build: F)
    where
        F: FnOnce() -> Option<Result<BoxedConnector, BackendError>>,
    {
        let connector: BoxedConnector = match build() {
            Some(Ok(connector)) => {
                info!(backend = %kind, service = kind.service(), "Backend connector ready");
                connector
            }
            Some(Err(e)) => {
                warn!(backend = %kind, error = %e, "Backend connector disabled: bad credentials");
                Arc::new(DisabledConnector::new(kind, e.message))
            }
            None => Arc::new(DisabledConnector::missing(
                kind,
                config.missing_settings(kind),
            )),
        };
        self.insert(connector);
    }

    /// Add or replace the connector for its kind.
    pub fn insert(&mut self, connector: BoxedConnector) {
        self.connectors.insert(connector.kind(), connector);
    }

    pub fn with(mut self, connector: BoxedConnector) -> Self {
        self.insert(connector);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<&BoxedConnector> {
        self.connectors.get(&kind)
    }

    /// Configuration presence per backend
    pub fn configured(&self) -> BTreeMap<BackendKind, bool> {
        self.connectors
            .iter()
            .map(|(kind, c)| (*kind, c.is_configured()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}
