//! Integration tests for the streaming and push transports

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use sm_backends::{Arguments, BackendConnector, BackendError, ConnectorSet};
use sm_core::{BackendKind, ServerSettings, TimeoutSettings};
use sm_mcp::{builtin_registry, router, Gateway, SESSION_HEADER};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct RepoLister;

#[async_trait]
impl BackendConnector for RepoLister {
    fn kind(&self) -> BackendKind {
        BackendKind::SourceHost
    }

    async fn invoke(&self, operation: &str, _args: &Arguments) -> Result<Value, BackendError> {
        Ok(json!({"operation": operation, "repos": [{"name": "gateway"}]}))
    }
}

fn app_with(settings: ServerSettings) -> (Arc<Gateway>, Router) {
    let gateway = Arc::new(Gateway::new(
        Arc::new(builtin_registry().unwrap()),
        ConnectorSet::new().with(Arc::new(RepoLister)),
        TimeoutSettings::uniform(Duration::from_secs(5)),
        &settings,
    ));
    let app = router(gateway.clone());
    (gateway, app)
}

fn app() -> (Arc<Gateway>, Router) {
    app_with(ServerSettings::default())
}

fn rpc(id: i64, method: &str, params: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
}

fn post(uri: &str, session: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(session) = session {
        builder = builder.header(SESSION_HEADER, session);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read one SSE event as (event name, data)
async fn next_event<S>(body: &mut S, buffer: &mut String) -> Option<(String, String)>
where
    S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
{
    loop {
        if let Some(end) = buffer.find("\n\n") {
            let raw: String = buffer.drain(..end + 2).collect();
            let mut name = String::from("message");
            let mut data = String::new();
            for line in raw.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = v.trim().to_string();
                } else if let Some(v) = line.strip_prefix("data:") {
                    data.push_str(v.trim_start());
                }
            }
            if data.is_empty() && raw.starts_with(':') {
                continue; // keep-alive comment
            }
            return Some((name, data));
        }
        let chunk = body.next().await?.ok()?;
        buffer.push_str(std::str::from_utf8(&chunk).ok()?);
    }
}

#[tokio::test]
async fn test_streaming_session_lifecycle() {
    let (gateway, app) = app();

    let response = app
        .clone()
        .oneshot(post("/mcp", None, rpc(1, "initialize", json!({"clientInfo": {"name": "t"}}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = response
        .headers()
        .get(SESSION_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = json_body(response).await;
    assert_eq!(body["result"]["serverInfo"]["name"], sm_core::GATEWAY_NAME);
    assert_eq!(gateway.sessions().count(), 1);

    // the session is reused, not duplicated
    let response = app
        .clone()
        .oneshot(post("/mcp", Some(&session), rpc(2, "tools/list", json!({}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["result"]["tools"].as_array().unwrap().len(), 16);
    assert_eq!(gateway.sessions().count(), 1);

    let response = app
        .clone()
        .oneshot(
            post(
                "/mcp",
                Some(&session),
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
            ),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header(SESSION_HEADER, &session)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(post("/mcp", Some(&session), rpc(3, "ping", json!({}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_streaming_tool_call_and_unknown_tool() {
    let (_gateway, app) = app();

    let response = app
        .clone()
        .oneshot(post(
            "/mcp",
            None,
            rpc(1, "tools/call", json!({"name": "github_list_repos", "arguments": {}})),
        ))
        .await
        .unwrap();
    let session = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();
    let body = json_body(response).await;
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["isError"], false);

    let response = app
        .oneshot(post(
            "/mcp",
            Some(&session),
            rpc(2, "tools/call", json!({"name": "slack_post", "arguments": {"text": "hi"}})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["result"]["isError"], true);
    assert_eq!(body["result"]["error"]["kind"], "UnknownTool");
}

#[tokio::test]
async fn test_unknown_session_and_bad_json() {
    let (_gateway, app) = app();

    let response = app
        .clone()
        .oneshot(post("/mcp", Some("no-such-session"), rpc(1, "ping", json!({}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(post("/mcp", None, "{not json".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], -32700);
}

#[tokio::test]
async fn test_push_session_delivers_responses_as_events() {
    let (gateway, app) = app();

    let sse = Request::builder().uri("/sse").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(sse).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body().into_data_stream();
    let mut buffer = String::new();

    let (name, endpoint) = next_event(&mut body, &mut buffer).await.unwrap();
    assert_eq!(name, "endpoint");
    assert!(endpoint.starts_with("/messages?session_id="));

    let response = app
        .clone()
        .oneshot(post(
            &endpoint,
            None,
            rpc(7, "tools/call", json!({"name": "github_list_repos"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let (name, data) = next_event(&mut body, &mut buffer).await.unwrap();
    assert_eq!(name, "message");
    let message: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(message["id"], 7);
    assert_eq!(message["result"]["isError"], false);

    // a push session id is not valid on the streaming endpoint
    let session_id = endpoint.trim_start_matches("/messages?session_id=").to_string();
    let response = app
        .clone()
        .oneshot(post("/mcp", Some(&session_id), rpc(8, "ping", json!({}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // legacy submission path
    let response = app
        .oneshot(post(
            &format!("/sse/{session_id}/message"),
            None,
            rpc(9, "ping", json!({})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let (_, data) = next_event(&mut body, &mut buffer).await.unwrap();
    assert_eq!(serde_json::from_str::<Value>(&data).unwrap()["id"], 9);

    // dropping the stream is a disconnect
    drop(body);
    assert!(gateway.sessions().get(&session_id).is_none());
}

#[tokio::test]
async fn test_both_transports_list_the_same_catalog() {
    let (_gateway, app) = app();

    let response = app
        .clone()
        .oneshot(post("/mcp", None, rpc(1, "tools/list", json!({}))))
        .await
        .unwrap();
    let streamed = json_body(response).await["result"]["tools"].clone();

    let sse = Request::builder().uri("/sse").body(Body::empty()).unwrap();
    let mut body = app.clone().oneshot(sse).await.unwrap().into_body().into_data_stream();
    let mut buffer = String::new();
    let (_, endpoint) = next_event(&mut body, &mut buffer).await.unwrap();

    app.oneshot(post(&endpoint, None, rpc(1, "tools/list", json!({}))))
        .await
        .unwrap();
    let (_, data) = next_event(&mut body, &mut buffer).await.unwrap();
    let pushed = serde_json::from_str::<Value>(&data).unwrap()["result"]["tools"].clone();

    assert_eq!(streamed, pushed);
}

#[tokio::test]
async fn test_push_overflow_ends_stream_with_error_event() {
    let (gateway, app) = app_with(ServerSettings {
        push_queue_capacity: 1,
        ..ServerSettings::default()
    });

    let sse = Request::builder().uri("/sse").body(Body::empty()).unwrap();
    let mut body = app.clone().oneshot(sse).await.unwrap().into_body().into_data_stream();
    let mut buffer = String::new();
    let (_, endpoint) = next_event(&mut body, &mut buffer).await.unwrap();
    let session_id = endpoint.trim_start_matches("/messages?session_id=").to_string();

    // the client stops reading; the second reply does not fit
    for id in 1..=2 {
        let response = app
            .clone()
            .oneshot(post(&endpoint, None, rpc(id, "ping", json!({}))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
    assert!(gateway.sessions().get(&session_id).is_none());

    let (name, _) = next_event(&mut body, &mut buffer).await.unwrap();
    assert_eq!(name, "message");
    let (name, data) = next_event(&mut body, &mut buffer).await.unwrap();
    assert_eq!(name, "error");
    let error: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(error["kind"], "SessionClosed");
    assert!(next_event(&mut body, &mut buffer).await.is_none());

    // later submissions find no session
    let response = app
        .oneshot(post(&endpoint, None, rpc(3, "ping", json!({}))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_quiet_push_stream_gets_keep_alive_comments() {
    let (gateway, app) = app_with(ServerSettings {
        keep_alive: Duration::from_secs(5),
        ..ServerSettings::default()
    });

    let sse = Request::builder().uri("/sse").body(Body::empty()).unwrap();
    let mut body = app.oneshot(sse).await.unwrap().into_body().into_data_stream();
    let mut buffer = String::new();
    let (_, endpoint) = next_event(&mut body, &mut buffer).await.unwrap();
    let session_id = endpoint.trim_start_matches("/messages?session_id=").to_string();

    let started = tokio::time::Instant::now();
    let chunk = body.next().await.unwrap().unwrap();
    assert!(chunk.starts_with(b":"), "expected a comment frame");
    assert!(started.elapsed() >= Duration::from_secs(5));

    // a held stream is not an idle session
    tokio::time::advance(Duration::from_secs(600)).await;
    assert_eq!(gateway.sessions().reap_idle(), 0);
    assert!(gateway.sessions().get(&session_id).is_some());
}

#[tokio::test]
async fn test_health_and_tool_listing_endpoints() {
    let (_gateway, app) = app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health = json_body(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["registry_size"], 16);
    assert_eq!(health["backends"]["source_host"]["configured"], true);

    let response = app
        .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let tools = json_body(response).await;
    assert_eq!(tools["total"], 16);
    assert_eq!(tools["services"]["asana"].as_array().unwrap().len(), 5);
    assert_eq!(tools["services"]["github"][0]["name"], "github_list_repos");
}
