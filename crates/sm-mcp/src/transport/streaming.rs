//! Streaming HTTP transport
//!
//! One JSON-RPC request per `POST /mcp`; the HTTP reply carries the
//! response. The session travels in the `Mcp-Session-Id` header: a request
//! without it opens a new session, an unknown id gets 404, and
//! `DELETE /mcp` closes the session.

use super::Transport;
use crate::dispatcher::{ToolCallResult, ToolError};
use crate::protocol::{JsonRpcError, McpRequest, McpResponse};
use crate::server::{Gateway, Outcome};
use crate::session::{CloseReason, Session};
use crate::SESSION_HEADER;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use sm_core::{ErrorKind, TransportKind};
use std::sync::Arc;
use tracing::debug;

pub struct StreamingTransport;

impl Transport for StreamingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Streaming
    }

    fn routes(&self) -> Router<Arc<Gateway>> {
        Router::new().route("/mcp", post(mcp_post).delete(mcp_delete))
    }
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn session_not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(McpResponse::error(
            None,
            JsonRpcError::invalid_request(format!("Session not found: {id}")),
        )),
    )
        .into_response()
}

/// Attach the session header to a response
fn with_session(session: &Session, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if let Ok(value) = HeaderValue::from_str(session.id()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

async fn mcp_post(State(gateway): State<Arc<Gateway>>, headers: HeaderMap, body: Bytes) -> Response {
    let request: McpRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(McpResponse::error(None, JsonRpcError::parse_error(e.to_string()))),
            )
                .into_response();
        }
    };

    let session = match session_id(&headers) {
        Some(id) => match gateway.sessions().get(id) {
            Some(session) if session.transport() == TransportKind::Streaming => session,
            _ => return session_not_found(id),
        },
        None => gateway.sessions().open(),
    };
    debug!(session = %session.id(), method = %request.method, "Streaming request");

    match gateway.handle(&session, request) {
        Outcome::Respond(response) => with_session(&session, Json(response)),
        Outcome::Await { id, reply } => {
            let response = reply.await.unwrap_or_else(|_| {
                // the session closed while the call was running
                let error = ToolError::new(
                    ErrorKind::SessionClosed,
                    format!("Session {} closed before the call completed", session.id()),
                );
                let result = ToolCallResult::err(id.clone(), error);
                McpResponse::success(Some(id), result.to_mcp_content())
            });
            with_session(&session, Json(response))
        }
        Outcome::Queued | Outcome::Notification => with_session(&session, StatusCode::ACCEPTED),
    }
}

async fn mcp_delete(State(gateway): State<Arc<Gateway>>, headers: HeaderMap) -> Response {
    let Some(id) = session_id(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(McpResponse::error(
                None,
                JsonRpcError::invalid_request(format!("Missing {SESSION_HEADER} header")),
            )),
        )
            .into_response();
    };

    match gateway.sessions().get(id) {
        Some(session) if session.transport() == TransportKind::Streaming => {
            gateway.sessions().close(id, CloseReason::ClientRequest);
            StatusCode::NO_CONTENT.into_response()
        }
        _ => session_not_found(id),
    }
}
