//! Gateway core
//!
//! Transport-agnostic MCP handling shared by the streaming and push
//! transports. A transport finds or opens the session, hands each decoded
//! request to [`Gateway::handle`], and frames the [`Outcome`] for its wire.

use crate::catalog::builtin_registry;
use crate::dispatcher::{Dispatcher, ToolCallRequest, ToolCallResult};
use crate::health::{HealthReporter, StatusConnector};
use crate::protocol::{JsonRpcError, McpRequest, McpResponse};
use crate::registry::ToolRegistry;
use crate::session::{Route, Session, SessionManager};
use crate::PROTOCOL_VERSION;
use serde_json::{json, Value};
use sm_backends::{Arguments, ConnectorSet};
use sm_core::{GatewayConfig, GatewayError, ServerSettings, TimeoutSettings, TransportKind};
use sm_core::{GATEWAY_NAME, GATEWAY_VERSION};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// What a transport must do with a handled request
#[derive(Debug)]
pub enum Outcome {
    /// Reply right away
    Respond(McpResponse),
    /// A tool call is running; its response arrives on `reply`
    Await {
        id: Value,
        reply: oneshot::Receiver<McpResponse>,
    },
    /// A tool call is running; its response goes to the push queue
    Queued,
    /// Notification: nothing to send back
    Notification,
}

pub struct Gateway {
    sessions: Arc<SessionManager>,
    health: HealthReporter,
    keep_alive: Duration,
}

impl Gateway {
    /// Wire up registry, connectors, health and sessions.
    ///
    /// The `gateway_status` connector is added to `connectors` here.
    pub fn new(
        registry: Arc<ToolRegistry>,
        mut connectors: ConnectorSet,
        timeouts: TimeoutSettings,
        server: &ServerSettings,
    ) -> Self {
        let health = HealthReporter::new(registry.clone(), &connectors);
        connectors.insert(Arc::new(StatusConnector::new(health.clone())));

        let dispatcher = Arc::new(Dispatcher::new(registry, connectors, timeouts));
        let sessions = Arc::new(SessionManager::new(
            dispatcher,
            server.idle_timeout,
            server.push_queue_capacity,
        ));
        Self {
            sessions,
            health,
            keep_alive: server.keep_alive,
        }
    }

    /// Build the gateway with the built-in catalog and configured backends.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let registry = Arc::new(builtin_registry()?);
        let connectors = ConnectorSet::from_config(config);
        info!(
            tools = registry.len(),
            configured = connectors.configured().values().filter(|c| **c).count(),
            "Gateway initialized"
        );
        Ok(Self::new(
            registry,
            connectors,
            config.timeouts.clone(),
            &config.server,
        ))
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn health(&self) -> &HealthReporter {
        &self.health
    }

    /// Keep-alive interval for push streams
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.sessions.dispatcher().registry()
    }

    /// Handle one JSON-RPC message received on `session`.
    pub fn handle(&self, session: &Arc<Session>, request: McpRequest) -> Outcome {
        session.touch();
        debug!(session = %session.id(), method = %request.method, "Handling MCP request");

        if request.is_notification() {
            debug!(method = %request.method, "Notification received");
            return Outcome::Notification;
        }
        if let Err(error) = request.check_version() {
            return Outcome::Respond(McpResponse::error(request.id, error));
        }

        match request.method.as_str() {
            "initialize" => Outcome::Respond(self.handle_initialize(session, request)),
            "ping" => Outcome::Respond(McpResponse::success(request.id, json!({}))),
            "tools/list" => Outcome::Respond(McpResponse::success(
                request.id,
                json!({ "tools": self.registry().to_mcp_list() }),
            )),
            "tools/call" => self.handle_tools_call(session, request),
            _ => Outcome::Respond(McpResponse::error(
                request.id,
                JsonRpcError::method_not_found(&request.method),
            )),
        }
    }

    fn handle_initialize(&self, session: &Session, request: McpRequest) -> McpResponse {
        let client = request
            .param("clientInfo")
            .and_then(|ci| ci.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("unknown");
        info!(session = %session.id(), client = %client, "Client initialized");

        McpResponse::success(
            request.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false }
                },
                "serverInfo": {
                    "name": GATEWAY_NAME,
                    "version": GATEWAY_VERSION
                }
            }),
        )
    }

    fn handle_tools_call(&self, session: &Arc<Session>, request: McpRequest) -> Outcome {
        let id = request.id.clone().unwrap_or(Value::Null);
        let params = request.params.unwrap_or(Value::Null);

        let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
            return Outcome::Respond(McpResponse::error(
                Some(id),
                JsonRpcError::invalid_params("Missing tool name"),
            ));
        };
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Arguments::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Outcome::Respond(McpResponse::error(
                    Some(id),
                    JsonRpcError::invalid_params("'arguments' must be an object"),
                ));
            }
        };

        let call = ToolCallRequest {
            session_id: session.id().to_string(),
            request_id: id.clone(),
            tool_name: tool_name.to_string(),
            arguments,
        };

        let (route, reply) = match session.transport() {
            TransportKind::Streaming => {
                let (tx, rx) = oneshot::channel();
                (Route::Reply(tx), Some(rx))
            }
            TransportKind::Push => (Route::Push, None),
        };

        if let Err(e) = self.sessions.submit(session, call, route) {
            let result = ToolCallResult::err(id.clone(), e.into());
            return Outcome::Respond(McpResponse::success(Some(id), result.to_mcp_content()));
        }

        match reply {
            Some(reply) => Outcome::Await { id, reply },
            None => Outcome::Queued,
        }
    }
}
