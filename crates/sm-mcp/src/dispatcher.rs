//! Tool call dispatch
//!
//! Resolve the tool, check and coerce its arguments against the declared
//! schema, then invoke the owning connector under that backend's deadline.
//! Every failure comes back as a [`ToolError`] inside the result; nothing
//! here panics or ends the session.

use crate::registry::{ParamSpec, ParamType, ToolDescriptor, ToolRegistry};
use serde::Serialize;
use serde_json::{json, Value};
use sm_backends::{Arguments, ConnectorSet};
use sm_core::{ErrorKind, TimeoutSettings};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// One `tools/call` as seen by the dispatcher
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub session_id: String,
    /// The client's JSON-RPC id
    pub request_id: Value,
    pub tool_name: String,
    pub arguments: Arguments,
}

/// Client-visible failure of a single call
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArguments, message)
    }
}

/// Outcome of one call, correlated by the client's request id
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub request_id: Value,
    pub outcome: Result<Value, ToolError>,
}

impl ToolCallResult {
    pub fn ok(request_id: Value, value: Value) -> Self {
        Self {
            request_id,
            outcome: Ok(value),
        }
    }

    pub fn err(request_id: Value, error: ToolError) -> Self {
        Self {
            request_id,
            outcome: Err(error),
        }
    }

    /// MCP `tools/call` result body
    pub fn to_mcp_content(&self) -> Value {
        match &self.outcome {
            Ok(value) => json!({
                "content": [{
                    "type": "text",
                    "text": serde_json::to_string_pretty(value).unwrap_or_default()
                }],
                "isError": false
            }),
            Err(error) => json!({
                "content": [{
                    "type": "text",
                    "text": error.to_string()
                }],
                "isError": true,
                "error": error
            }),
        }
    }
}

/// Routes tool calls to backend connectors.
///
/// Holds only the read-only registry and stateless connectors, so one
/// instance is shared by every session.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    connectors: ConnectorSet,
    timeouts: TimeoutSettings,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        connectors: ConnectorSet,
        timeouts: TimeoutSettings,
    ) -> Self {
        Self {
            registry,
            connectors,
            timeouts,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn connectors(&self) -> &ConnectorSet {
        &self.connectors
    }

    pub async fn dispatch(&self, request: ToolCallRequest) -> ToolCallResult {
        let ToolCallRequest {
            session_id,
            request_id,
            tool_name,
            arguments,
        } = request;

        match self.run(&session_id, &tool_name, arguments).await {
            Ok(value) => ToolCallResult::ok(request_id, value),
            Err(error) => {
                warn!(
                    session = %session_id,
                    tool = %tool_name,
                    kind = %error.kind,
                    error = %error.message,
                    "Tool call failed"
                );
                ToolCallResult::err(request_id, error)
            }
        }
    }

    async fn run(
        &self,
        session_id: &str,
        tool_name: &str,
        arguments: Arguments,
    ) -> Result<Value, ToolError> {
        let descriptor = self
            .registry
            .resolve(tool_name)
            .map_err(|_| ToolError::new(ErrorKind::UnknownTool, format!("Unknown tool: {tool_name}")))?;

        let arguments = validate_arguments(descriptor, arguments)?;

        let connector = self.connectors.get(descriptor.backend).ok_or_else(|| {
            ToolError::new(
                ErrorKind::ConfigurationMissing,
                format!("{} is not available", descriptor.backend.service()),
            )
        })?;

        let deadline = self.timeouts.for_backend(descriptor.backend);
        let started = Instant::now();
        debug!(session = %session_id, tool = %tool_name, backend = %descriptor.backend, "Invoking backend");

        let outcome =
            tokio::time::timeout(deadline, connector.invoke(&descriptor.operation, &arguments))
                .await;
        debug!(
            session = %session_id,
            tool = %tool_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Backend returned"
        );

        match outcome {
            Err(_) => Err(ToolError::new(
                ErrorKind::BackendTimeout,
                format!(
                    "{} did not respond within {}s",
                    descriptor.backend.service(),
                    deadline.as_secs_f64()
                ),
            )),
            Ok(Err(e)) => Err(ToolError::new(e.client_kind(), e.message)),
            Ok(Ok(value)) => Ok(value),
        }
    }
}

/// Check required parameters and coerce declared ones to their types.
///
/// `null` counts as absent; keys the schema does not declare pass through.
pub fn validate_arguments(
    descriptor: &ToolDescriptor,
    mut arguments: Arguments,
) -> Result<Arguments, ToolError> {
    for spec in &descriptor.params {
        let value = arguments.remove(&spec.name).filter(|v| !v.is_null());
        match value {
            None if spec.required => {
                return Err(ToolError::invalid(format!(
                    "Missing required parameter '{}' for {}",
                    spec.name, descriptor.name
                )));
            }
            None => {}
            Some(value) => {
                let coerced = coerce(spec, value)?;
                arguments.insert(spec.name.clone(), coerced);
            }
        }
    }
    Ok(arguments)
}

fn coerce(spec: &ParamSpec, value: Value) -> Result<Value, ToolError> {
    let mismatch = || {
        ToolError::invalid(format!(
            "Parameter '{}' must be of type {}",
            spec.name,
            spec.param_type.as_str()
        ))
    };

    match (spec.param_type, value) {
        (ParamType::String, v @ Value::String(_)) => Ok(v),
        (ParamType::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (ParamType::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),

        (ParamType::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(whole_i64))
            .map(Value::from)
            .ok_or_else(mismatch),
        (ParamType::Integer, Value::String(s)) => {
            s.trim().parse::<i64>().map(Value::from).map_err(|_| mismatch())
        }

        (ParamType::Boolean, v @ Value::Bool(_)) => Ok(v),
        (ParamType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },

        (ParamType::Object, v @ Value::Object(_)) => Ok(v),
        (ParamType::Object, Value::String(s)) => match serde_json::from_str::<Value>(&s) {
            Ok(v @ Value::Object(_)) => Ok(v),
            _ => Err(mismatch()),
        },

        _ => Err(mismatch()),
    }
}

/// `f` as an i64 if it is a whole number inside the i64 range.
fn whole_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is out of range
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}
