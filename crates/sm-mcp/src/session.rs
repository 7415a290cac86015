//! Session Layer
//!
//! One session per client connection. A session tracks the calls it has in
//! flight, keyed by the client's request id, and routes each result back to
//! the connection that asked: a oneshot reply for the streaming transport,
//! the bounded push queue for the SSE transport.
//!
//! Session state sits behind a `std::sync::Mutex` that is only taken in
//! synchronous sections; nothing holds it across an `.await`.

use crate::dispatcher::{Dispatcher, ToolCallRequest, ToolCallResult, ToolError};
use crate::protocol::McpResponse;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sm_core::{ErrorKind, TransportKind};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session {0} is closed")]
    Closed(String),

    #[error("Request id {0} is already in flight")]
    DuplicateRequest(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound(_) | SessionError::Closed(_) => ErrorKind::SessionClosed,
            SessionError::DuplicateRequest(_) => ErrorKind::InvalidArguments,
        }
    }
}

impl From<SessionError> for ToolError {
    fn from(err: SessionError) -> Self {
        ToolError::new(err.kind(), err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// At least one call in flight
    Active,
    /// Open with nothing in flight
    Idle,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `DELETE /mcp` or server shutdown
    ClientRequest,
    /// The client's connection went away
    Disconnected,
    IdleTimeout,
    /// The push queue overflowed
    Backpressure,
}

impl CloseReason {
    /// Failure reasons are reported to the client with a final error frame
    pub fn is_failure(&self) -> bool {
        matches!(self, CloseReason::Backpressure)
    }

    pub fn message(&self) -> &'static str {
        match self {
            CloseReason::ClientRequest => "session closed by client",
            CloseReason::Disconnected => "client disconnected",
            CloseReason::IdleTimeout => "session idle timeout",
            CloseReason::Backpressure => "push queue full: client is not reading events",
        }
    }
}

/// Where the result of an in-flight call goes
#[derive(Debug)]
pub enum Route {
    /// Back to the HTTP exchange that is waiting for it
    Reply(oneshot::Sender<McpResponse>),
    /// Onto the session's push queue
    Push,
}

/// What happened to a response handed to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The session is closed or the call is no longer tracked
    Discarded,
    /// The push queue is full; the session must be closed
    Overflow,
}

#[derive(Debug)]
struct SessionInner {
    close_reason: Option<CloseReason>,
    last_activity: Instant,
    in_flight: HashMap<String, Route>,
    messages: u64,
    push_tx: Option<mpsc::Sender<McpResponse>>,
}

/// One logical client conversation
#[derive(Debug)]
pub struct Session {
    id: String,
    transport: TransportKind,
    created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
}

/// Key under which a call is tracked: the JSON text of its id, so `1` and
/// `"1"` are distinct.
pub fn request_key(id: &Value) -> String {
    id.to_string()
}

impl Session {
    fn new(transport: TransportKind, push_tx: Option<mpsc::Sender<McpResponse>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            transport,
            created_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                close_reason: None,
                last_activity: Instant::now(),
                in_flight: HashMap::new(),
                messages: 0,
                push_tx,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        let inner = self.lock();
        if inner.close_reason.is_some() {
            SessionState::Closed
        } else if inner.in_flight.is_empty() {
            SessionState::Idle
        } else {
            SessionState::Active
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().close_reason.is_some()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lock().close_reason
    }

    pub fn pending_calls(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// A push session whose event stream is still being held by a client
    pub fn has_listener(&self) -> bool {
        self.lock()
            .push_tx
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn message_count(&self) -> u64 {
        self.lock().messages
    }

    /// How long since the last message or completed call
    pub fn idle_for(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    /// Record an incoming protocol message.
    pub fn touch(&self) {
        let mut inner = self.lock();
        inner.messages += 1;
        inner.last_activity = Instant::now();
    }

    /// Start tracking a call.
    pub fn begin(&self, request_id: &Value, route: Route) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if inner.close_reason.is_some() {
            return Err(SessionError::Closed(self.id.clone()));
        }
        let key = request_key(request_id);
        if inner.in_flight.contains_key(&key) {
            return Err(SessionError::DuplicateRequest(key));
        }
        inner.in_flight.insert(key, route);
        inner.last_activity = Instant::now();
        Ok(())
    }

    /// Route the result of a tracked call to its origin.
    ///
    /// The call stops being tracked here, exactly once; a second completion
    /// for the same id, or one arriving after close, is discarded.
    pub fn complete(&self, request_id: &Value, response: McpResponse) -> Delivery {
        let mut inner = self.lock();
        if inner.close_reason.is_some() {
            return Delivery::Discarded;
        }
        let Some(route) = inner.in_flight.remove(&request_key(request_id)) else {
            return Delivery::Discarded;
        };
        inner.last_activity = Instant::now();
        match route {
            Route::Reply(reply) => match reply.send(response) {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Discarded,
            },
            Route::Push => push_locked(&mut inner, response),
        }
    }

    /// Queue a response on the push stream without tracking.
    pub fn push(&self, response: McpResponse) -> Delivery {
        let mut inner = self.lock();
        if inner.close_reason.is_some() {
            return Delivery::Discarded;
        }
        push_locked(&mut inner, response)
    }

    /// Mark closed and drop everything in flight. Returns the number of
    /// discarded calls, or `None` if the session was already closed.
    fn close(&self, reason: CloseReason) -> Option<usize> {
        let mut inner = self.lock();
        if inner.close_reason.is_some() {
            return None;
        }
        inner.close_reason = Some(reason);
        inner.push_tx = None;
        let discarded = inner.in_flight.len();
        inner.in_flight.clear();
        Some(discarded)
    }
}

fn push_locked(inner: &mut SessionInner, response: McpResponse) -> Delivery {
    match inner.push_tx.as_ref().map(|tx| tx.try_send(response)) {
        Some(Ok(())) => Delivery::Delivered,
        Some(Err(mpsc::error::TrySendError::Full(_))) => Delivery::Overflow,
        Some(Err(mpsc::error::TrySendError::Closed(_))) | None => Delivery::Discarded,
    }
}

/// Owns every open session and spawns their dispatch tasks
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    dispatcher: Arc<Dispatcher>,
    idle_timeout: Duration,
    push_queue_capacity: usize,
}

impl SessionManager {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        idle_timeout: Duration,
        push_queue_capacity: usize,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            dispatcher,
            idle_timeout,
            push_queue_capacity: push_queue_capacity.max(1),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Open a streaming (request/response) session.
    pub fn open(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(TransportKind::Streaming, None));
        self.insert(session.clone());
        session
    }

    /// Open a push session together with the receiving end of its queue.
    pub fn open_push(&self) -> (Arc<Session>, mpsc::Receiver<McpResponse>) {
        let (tx, rx) = mpsc::channel(self.push_queue_capacity);
        let session = Arc::new(Session::new(TransportKind::Push, Some(tx)));
        self.insert(session.clone());
        (session, rx)
    }

    fn insert(&self, session: Arc<Session>) {
        info!(session = %session.id(), transport = ?session.transport(), "Session opened");
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id().to_string(), session);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Remove and close a session. Returns false if it was not open.
    pub fn close(&self, id: &str, reason: CloseReason) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        let Some(session) = removed else {
            return false;
        };
        let age_secs = (Utc::now() - session.created_at()).num_seconds();
        match session.close(reason) {
            Some(discarded) if reason.is_failure() => {
                warn!(session = %id, reason = reason.message(), discarded, age_secs, "Session closed");
            }
            Some(discarded) => {
                info!(session = %id, reason = reason.message(), discarded, age_secs, "Session closed");
            }
            None => {}
        }
        true
    }

    /// Track a call and run it on its own task.
    ///
    /// The task dispatches, then completes the call on the session; a push
    /// overflow at that point closes the session.
    pub fn submit(
        self: &Arc<Self>,
        session: &Arc<Session>,
        request: ToolCallRequest,
        route: Route,
    ) -> Result<(), SessionError> {
        session.begin(&request.request_id, route)?;
        debug!(
            session = %session.id(),
            tool = %request.tool_name,
            pending = session.pending_calls(),
            "Tool call submitted"
        );

        let manager = Arc::clone(self);
        let session = Arc::clone(session);
        tokio::spawn(async move {
            let result = manager.dispatcher.dispatch(request).await;
            manager.complete(&session, result);
        });
        Ok(())
    }

    /// Deliver a finished call to its session.
    pub fn complete(&self, session: &Session, result: ToolCallResult) -> Delivery {
        let id = result.request_id.clone();
        let response = McpResponse::success(Some(id.clone()), result.to_mcp_content());
        let delivery = session.complete(&id, response);
        self.after_delivery(session, delivery);
        delivery
    }

    /// Push an untracked response (e.g. a `tools/list` reply on the SSE
    /// transport).
    pub fn push(&self, session: &Session, response: McpResponse) -> Delivery {
        let delivery = session.push(response);
        self.after_delivery(session, delivery);
        delivery
    }

    fn after_delivery(&self, session: &Session, delivery: Delivery) {
        match delivery {
            Delivery::Overflow => {
                self.close(session.id(), CloseReason::Backpressure);
            }
            Delivery::Discarded => {
                debug!(session = %session.id(), "Result discarded");
            }
            Delivery::Delivered => {}
        }
    }

    /// Close sessions with nothing in flight that have been quiet for longer
    /// than the idle timeout. Push sessions with a connected listener are
    /// left to the disconnect path. Returns how many were closed.
    pub fn reap_idle(&self) -> usize {
        let expired: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.state() == SessionState::Idle && !s.has_listener())
            .filter(|s| s.idle_for() >= self.idle_timeout)
            .map(|s| s.id().to_string())
            .collect();

        expired
            .iter()
            .filter(|id| self.close(id, CloseReason::IdleTimeout))
            .count()
    }

    /// Periodically reap idle sessions until the manager is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let period = (self.idle_timeout / 4).clamp(Duration::from_secs(1), Duration::from_secs(30));
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let reaped = manager.reap_idle();
                if reaped > 0 {
                    info!(reaped, open = manager.count(), "Reaped idle sessions");
                }
            }
        })
    }

    /// Close every session (server shutdown).
    pub fn close_all(&self) {
        let ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        for id in ids {
            self.close(&id, CloseReason::ClientRequest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_registry;
    use async_trait::async_trait;
    use serde_json::json;
    use sm_backends::{Arguments, BackendConnector, BackendError, ConnectorSet};
    use sm_core::{BackendKind, TimeoutSettings};

    /// Sleeps for `delay_ms` (from the arguments) then echoes them back
    struct SlowEcho;

    #[async_trait]
    impl BackendConnector for SlowEcho {
        fn kind(&self) -> BackendKind {
            BackendKind::SourceHost
        }

        async fn invoke(&self, _operation: &str, args: &Arguments) -> Result<Value, BackendError> {
            let delay = args.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(json!({"echo": args}))
        }
    }

    fn manager(queue: usize) -> Arc<SessionManager> {
        let dispatcher = Dispatcher::new(
            Arc::new(builtin_registry().unwrap()),
            ConnectorSet::new().with(Arc::new(SlowEcho)),
            TimeoutSettings::uniform(Duration::from_secs(30)),
        );
        Arc::new(SessionManager::new(
            Arc::new(dispatcher),
            Duration::from_secs(300),
            queue,
        ))
    }

    fn call(session: &Session, id: Value, delay_ms: u64) -> ToolCallRequest {
        ToolCallRequest {
            session_id: session.id().to_string(),
            request_id: id,
            tool_name: "github_list_repos".into(),
            arguments: json!({"delay_ms": delay_ms}).as_object().cloned().unwrap(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_are_correlated_by_request_id() {
        let manager = manager(64);
        let session = manager.open();

        let mut replies = Vec::new();
        for i in 0..8u64 {
            let (tx, rx) = oneshot::channel();
            // later ids finish first
            manager
                .submit(&session, call(&session, json!(i), 100 - i * 10), Route::Reply(tx))
                .unwrap();
            replies.push((i, rx));
        }
        assert_eq!(session.pending_calls(), 8);
        assert_eq!(session.state(), SessionState::Active);

        for (i, rx) in replies {
            let response = rx.await.unwrap();
            assert_eq!(response.id, Some(json!(i)));
            let text = response.result.unwrap()["content"][0]["text"]
                .as_str()
                .unwrap()
                .to_string();
            assert!(text.contains(&format!("\"delay_ms\": {}", 100 - i * 10)));
        }
        assert_eq!(session.pending_calls(), 0);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_duplicate_in_flight_id_is_rejected() {
        let manager = manager(64);
        let session = manager.open();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();

        session.begin(&json!("a"), Route::Reply(tx1)).unwrap();
        let err = session.begin(&json!("a"), Route::Reply(tx2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert_eq!(session.pending_calls(), 1);
    }

    #[tokio::test]
    async fn test_completion_counts_down_exactly_once() {
        let manager = manager(64);
        let session = manager.open();
        let (tx, rx) = oneshot::channel();
        session.begin(&json!(7), Route::Reply(tx)).unwrap();

        let result = ToolCallResult::ok(json!(7), json!({"ok": true}));
        assert_eq!(manager.complete(&session, result.clone()), Delivery::Delivered);
        assert_eq!(manager.complete(&session, result), Delivery::Discarded);
        assert_eq!(session.pending_calls(), 0);
        assert!(rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_discards_pending_and_rejects_new_calls() {
        let manager = manager(64);
        let session = manager.open();

        let mut replies = Vec::new();
        for i in 0..3 {
            let (tx, rx) = oneshot::channel();
            manager
                .submit(&session, call(&session, json!(i), 1_000), Route::Reply(tx))
                .unwrap();
            replies.push(rx);
        }

        assert!(manager.close(session.id(), CloseReason::ClientRequest));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(manager.get(session.id()).is_none());

        for rx in replies {
            assert!(rx.await.is_err(), "closed session must not deliver results");
        }

        let (tx, _rx) = oneshot::channel();
        let err = manager
            .submit(&session, call(&session, json!(99), 0), Route::Reply(tx))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);
    }

    #[tokio::test]
    async fn test_push_overflow_closes_session_as_backpressure() {
        let manager = manager(2);
        let (session, mut rx) = manager.open_push();

        for i in 0..2 {
            let delivery = manager.push(&session, McpResponse::success(Some(json!(i)), json!({})));
            assert_eq!(delivery, Delivery::Delivered);
        }
        let delivery = manager.push(&session, McpResponse::success(Some(json!(2)), json!({})));
        assert_eq!(delivery, Delivery::Overflow);
        assert_eq!(session.close_reason(), Some(CloseReason::Backpressure));
        assert!(manager.get(session.id()).is_none());

        // buffered frames drain, then the queue ends
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_are_reaped_after_timeout() {
        let manager = manager(64);
        let idle = manager.open();
        let busy = manager.open();
        let (tx, _rx) = oneshot::channel();
        manager
            .submit(&busy, call(&busy, json!(1), 3_600_000), Route::Reply(tx))
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(manager.reap_idle(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(manager.reap_idle(), 1);
        assert_eq!(idle.close_reason(), Some(CloseReason::IdleTimeout));
        assert!(manager.get(busy.id()).is_some(), "sessions with pending calls stay open");
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_push_stream_is_not_reaped() {
        let manager = manager(64);
        let (held, rx) = manager.open_push();
        let (dropped, dropped_rx) = manager.open_push();
        drop(dropped_rx);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(manager.reap_idle(), 1);
        assert_eq!(dropped.close_reason(), Some(CloseReason::IdleTimeout));
        assert!(!held.is_closed());
        assert!(held.has_listener());

        drop(rx);
        assert_eq!(manager.reap_idle(), 1);
        assert_eq!(held.close_reason(), Some(CloseReason::IdleTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_task_closes_idle_sessions() {
        let manager = manager(64);
        let session = manager.open();
        let reaper = manager.spawn_reaper();

        tokio::time::sleep(Duration::from_secs(400)).await;
        assert!(session.is_closed());
        assert_eq!(manager.count(), 0);
        reaper.abort();
    }

    #[test]
    fn test_request_key_distinguishes_number_and_string_ids() {
        assert_ne!(request_key(&json!(1)), request_key(&json!("1")));
    }
}
