//! Server-push (SSE) transport
//!
//! `GET /sse` opens a push session and holds an event stream. The first
//! event is `endpoint`, naming where to POST requests. Submissions are
//! acknowledged with 202 and their responses arrive on the stream as
//! `message` events. When the session ends because the client stopped
//! reading, a final `error` event is sent before the stream closes.

use super::Transport;
use crate::protocol::{JsonRpcError, McpRequest, McpResponse};
use crate::server::{Gateway, Outcome};
use crate::session::{CloseReason, Session, SessionManager};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use sm_core::{ErrorKind, TransportKind};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct PushTransport {
    keep_alive: Duration,
}

impl PushTransport {
    /// `keep_alive` is the gap between comment frames on a quiet stream.
    pub fn new(keep_alive: Duration) -> Self {
        Self { keep_alive }
    }
}

impl Transport for PushTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    fn routes(&self) -> Router<Arc<Gateway>> {
        let keep_alive = self.keep_alive;
        Router::new()
            .route(
                "/sse",
                get(move |state: State<Arc<Gateway>>| sse_handler(state, keep_alive)),
            )
            .route("/messages", post(messages_handler))
            .route("/sse/:session_id/message", post(legacy_message_handler))
    }
}

/// Closes the session when the event stream is dropped (client went away).
struct DisconnectGuard {
    sessions: Arc<SessionManager>,
    session_id: String,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.sessions.close(&self.session_id, CloseReason::Disconnected) {
            info!(session = %self.session_id, "SSE client disconnected");
        }
    }
}

struct PushStream {
    rx: mpsc::Receiver<McpResponse>,
    session: Arc<Session>,
    finished: bool,
    _guard: DisconnectGuard,
}

fn message_event(response: &McpResponse) -> Event {
    Event::default()
        .event("message")
        .data(serde_json::to_string(response).unwrap_or_default())
}

fn error_event(reason: CloseReason) -> Event {
    Event::default().event("error").data(
        json!({
            "kind": ErrorKind::SessionClosed,
            "message": reason.message(),
        })
        .to_string(),
    )
}

async fn sse_handler(
    State(gateway): State<Arc<Gateway>>,
    keep_alive: Duration,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (session, rx) = gateway.sessions().open_push();
    info!(session = %session.id(), "SSE client connected");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?session_id={}", session.id()));

    let state = PushStream {
        rx,
        _guard: DisconnectGuard {
            sessions: gateway.sessions().clone(),
            session_id: session.id().to_string(),
        },
        session,
        finished: false,
    };

    let frames = stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        match state.rx.recv().await {
            Some(response) => Some((Ok::<_, Infallible>(message_event(&response)), state)),
            None => {
                // queue closed: the session is over
                state.finished = true;
                match state.session.close_reason() {
                    Some(reason) if reason.is_failure() => {
                        Some((Ok(error_event(reason)), state))
                    }
                    _ => None,
                }
            }
        }
    });

    let events = stream::once(future::ready(Ok(endpoint))).chain(frames);
    Sse::new(events).keep_alive(KeepAlive::new().interval(keep_alive))
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: Option<String>,
}

async fn messages_handler(
    State(gateway): State<Arc<Gateway>>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    match query.session_id {
        Some(id) => submit(&gateway, &id, &body),
        None => bad_request(JsonRpcError::invalid_request("Missing session_id")),
    }
}

async fn legacy_message_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Response {
    submit(&gateway, &session_id, &body)
}

fn bad_request(error: JsonRpcError) -> Response {
    (StatusCode::BAD_REQUEST, Json(McpResponse::error(None, error))).into_response()
}

fn submit(gateway: &Gateway, session_id: &str, body: &[u8]) -> Response {
    let session = match gateway.sessions().get(session_id) {
        Some(session) if session.transport() == TransportKind::Push => session,
        _ => {
            return (
                StatusCode::NOT_FOUND,
                Json(McpResponse::error(
                    None,
                    JsonRpcError::invalid_request(format!("Session not found: {session_id}")),
                )),
            )
                .into_response();
        }
    };

    let request: McpRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => return bad_request(JsonRpcError::parse_error(e.to_string())),
    };
    debug!(session = %session.id(), method = %request.method, "Push submission");

    match gateway.handle(&session, request) {
        Outcome::Respond(response) => {
            gateway.sessions().push(&session, response);
        }
        Outcome::Await { .. } | Outcome::Queued | Outcome::Notification => {}
    }
    (StatusCode::ACCEPTED, "Accepted").into_response()
}
