// Streamable HTTP transport: JSON-RPC over POST /mcp behind a bearer token

use crate::server::McpServer;
use crate::{SERVER_NAME, SERVER_VERSION};
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Header carrying the session id assigned on `initialize`
pub const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Clone)]
struct HttpState {
    server: Arc<McpServer>,
    auth_token: Arc<str>,
}

pub struct HttpTransport {
    bind_addr: String,
    auth_token: String,
}

impl HttpTransport {
    pub fn new(bind_addr: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            auth_token: auth_token.into(),
        }
    }

    pub async fn serve(self, server: Arc<McpServer>) -> Result<()> {
        let app = router(server, &self.auth_token);

        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;
        info!(addr = %self.bind_addr, "MCP HTTP transport listening");

        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Build the HTTP router. `/mcp` requires `Authorization: Bearer <token>`,
/// `/health` is open.
pub fn router(server: Arc<McpServer>, auth_token: &str) -> Router {
    let state = HttpState {
        server,
        auth_token: Arc::from(auth_token),
    };

    let mcp = Router::new()
        .route("/mcp", post(mcp_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .merge(mcp)
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}

/// Token from an `Authorization: Bearer ...` header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

async fn require_bearer(State(state): State<HttpState>, req: Request, next: Next) -> Response {
    match bearer_token(req.headers()) {
        Some(token) if token == &*state.auth_token => next.run(req).await,
        Some(_) => {
            warn!("Rejected MCP request with invalid token");
            unauthorized("Invalid token")
        }
        None => unauthorized("Missing bearer token"),
    }
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

async fn mcp_handler(State(state): State<HttpState>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body);
    let is_initialize = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v.get("method").and_then(Value::as_str).map(|m| m == "initialize"))
        .unwrap_or(false);

    let Some(reply) = state.server.handle_text(&text).await else {
        debug!("Notification accepted");
        return StatusCode::ACCEPTED.into_response();
    };

    let mut response = Json(reply).into_response();
    if is_initialize {
        let session_id = uuid::Uuid::new_v4().to_string();
        debug!(session_id = %session_id, "Session started");
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    response
}

async fn health_handler(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "server": SERVER_NAME,
        "version": SERVER_VERSION,
        "tools": state.server.registry().len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(McpServer::new(ToolRegistry::new())), "secret")
    }

    fn post_mcp(body: &str, token: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method("POST")
            .uri("/mcp")
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("Authorization", HeaderValue::from_static("Bearer token123"));
        assert_eq!(bearer_token(&headers), Some("token123"));

        headers.insert("Authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_requires_token() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

        let response = app().oneshot(post_mcp(body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app().oneshot(post_mcp(body, Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_initialize_assigns_session() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        let response = app().oneshot(post_mcp(body, Some("secret"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SESSION_HEADER));
        let reply = json_body(response).await;
        assert_eq!(reply["result"]["protocolVersion"], crate::PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_notification_is_accepted() {
        let body = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let response = app().oneshot(post_mcp(body, Some("secret"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_batch_and_parse_error() {
        let body = r#"[{"jsonrpc":"2.0","id":1,"method":"ping"},{"jsonrpc":"2.0","id":2,"method":"tools/list"}]"#;
        let response = app().oneshot(post_mcp(body, Some("secret"))).await.unwrap();
        let reply = json_body(response).await;
        assert_eq!(reply.as_array().unwrap().len(), 2);
        assert!(reply[1]["result"]["tools"].is_array());

        let response = app().oneshot(post_mcp("{oops", Some("secret"))).await.unwrap();
        let reply = json_body(response).await;
        assert_eq!(reply["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let request = HttpRequest::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health = json_body(response).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["tools"], 0);
    }
}
