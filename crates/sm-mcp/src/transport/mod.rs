//! Transport Layer
//!
//! Two adapters drive the same [`Gateway`]:
//! - Streaming (`POST /mcp`): the HTTP reply carries the JSON-RPC response
//! - Push (`GET /sse` + `POST /messages`): responses arrive as SSE events
//!
//! Both are mounted on one axum router next to the informational endpoints.

mod push;
mod streaming;

pub use push::PushTransport;
pub use streaming::StreamingTransport;

use crate::server::Gateway;
use crate::{PROTOCOL_VERSION, SESSION_HEADER};
use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use sm_core::{TransportKind, GATEWAY_NAME, GATEWAY_VERSION};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// A wire protocol on top of the gateway core.
///
/// Adapters contribute routes; accepting a connection, delivering a message
/// and pushing a response all happen inside those handlers.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn routes(&self) -> Router<Arc<Gateway>>;
}

/// Router with both transports and the informational endpoints.
pub fn router(gateway: Arc<Gateway>) -> Router {
    let push = PushTransport::new(gateway.keep_alive());
    router_with(gateway, &[&StreamingTransport, &push])
}

pub fn router_with(gateway: Arc<Gateway>, transports: &[&dyn Transport]) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/tools", get(tools_handler));
    for transport in transports {
        info!(transport = ?transport.kind(), "Mounting transport");
        app = app.merge(transport.routes());
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([HeaderName::from_static(SESSION_HEADER)]),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(gateway)
}

/// Bind `bind_addr` and serve until `shutdown` resolves.
pub async fn serve(
    gateway: Arc<Gateway>,
    bind_addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let reaper = gateway.sessions().spawn_reaper();
    let app = router(gateway.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "Gateway listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    reaper.abort();
    gateway.sessions().close_all();
    info!("Gateway stopped");
    served?;
    Ok(())
}

// === Handlers ===

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": GATEWAY_NAME,
        "version": GATEWAY_VERSION,
        "protocol": PROTOCOL_VERSION,
        "endpoints": {
            "mcp": "POST /mcp",
            "sse": "GET /sse",
            "messages": "POST /messages?session_id=<id>",
            "health": "GET /health",
            "tools": "GET /tools"
        }
    }))
}

async fn health_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(gateway.health().status())
}

/// Human-readable catalog grouped by backend service
async fn tools_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    let registry = gateway.registry();
    let groups: serde_json::Map<String, serde_json::Value> = registry
        .by_backend()
        .into_iter()
        .map(|(kind, tools)| {
            let entries = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "title": t.annotations.title,
                    })
                })
                .collect::<Vec<_>>();
            (kind.service().to_string(), json!(entries))
        })
        .collect();

    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-cache")],
        Json(json!({
            "total": registry.len(),
            "services": groups,
        })),
    )
}
