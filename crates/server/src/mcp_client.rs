// JSON-RPC client for a streamable-HTTP MCP server

use b24_mcp::protocol::{
    CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ToolSchema,
};
use b24_mcp::PROTOCOL_VERSION;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Error)]
pub enum McpClientError {
    #[error("MCP server unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MCP server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("MCP error: {0}")]
    Rpc(JsonRpcError),

    #[error("Invalid MCP response: {0}")]
    InvalidResponse(String),
}

impl McpClientError {
    /// The server rejected the tool name
    pub fn is_unknown_tool(&self) -> bool {
        matches!(self, Self::Rpc(e) if e.code == -32602 && e.message.starts_with("Unknown tool"))
    }
}

pub type McpClientResult<T> = Result<T, McpClientError>;

pub struct McpClient {
    http: reqwest::Client,
    url: String,
    auth_token: String,
    next_id: AtomicU64,
    /// Session id handed out on `initialize`, if the server uses sessions
    session: OnceCell<Option<String>>,
}

impl McpClient {
    pub fn new(
        url: impl Into<String>,
        auth_token: impl Into<String>,
        timeout: Duration,
    ) -> McpClientResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            auth_token: auth_token.into(),
            next_id: AtomicU64::new(1),
            session: OnceCell::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn list_tools(&self) -> McpClientResult<Vec<ToolSchema>> {
        let result = self.request("tools/list", json!({})).await?;
        let list: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| McpClientError::InvalidResponse(format!("tools/list: {}", e)))?;
        Ok(list.tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpClientResult<CallToolResult> {
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| McpClientError::InvalidResponse(format!("tools/call: {}", e)))
    }

    async fn request(&self, method: &str, params: Value) -> McpClientResult<Value> {
        let session = self
            .session
            .get_or_try_init(|| self.initialize())
            .await?
            .clone();
        self.rpc(method, params, session.as_deref()).await.map(|(result, _)| result)
    }

    /// Handshake: `initialize` then the `initialized` notification
    async fn initialize(&self) -> McpClientResult<Option<String>> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "b24-ui", "version": env!("CARGO_PKG_VERSION")}
        });
        let (result, session) = self.rpc("initialize", params, None).await?;

        info!(
            server = result["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            session = session.as_deref().unwrap_or("-"),
            "Connected to MCP server"
        );

        let notification = JsonRpcRequest::notification("notifications/initialized", None);
        let response = self
            .post(&notification, session.as_deref())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(McpClientError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(session)
    }

    fn post(&self, body: &JsonRpcRequest, session: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.auth_token))
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder
    }

    async fn rpc(
        &self,
        method: &str,
        params: Value,
        session: Option<&str>,
    ) -> McpClientResult<(Value, Option<String>)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        debug!(method = method, id = id, "MCP request");

        let response = self.post(&request, session).send().await?;
        let status = response.status();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.text().await?;

        if !status.is_success() {
            return Err(McpClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply = if is_sse {
            parse_sse(&body, id)?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body)
                .map_err(|e| McpClientError::InvalidResponse(e.to_string()))?
        };

        if let Some(error) = reply.error {
            return Err(McpClientError::Rpc(error));
        }
        Ok((reply.result.unwrap_or(Value::Null), session_id))
    }
}

/// Pick the response with the given id out of an event stream body
fn parse_sse(body: &str, id: u64) -> McpClientResult<JsonRpcResponse> {
    let mut events = Vec::new();
    let mut data = String::new();

    for line in body.lines() {
        if let Some(chunk) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(chunk.trim_start());
        } else if line.trim().is_empty() && !data.is_empty() {
            events.push(std::mem::take(&mut data));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    events
        .iter()
        .filter_map(|event| serde_json::from_str::<JsonRpcResponse>(event).ok())
        .find(|reply| reply.id == json!(id))
        .ok_or_else(|| McpClientError::InvalidResponse("no matching response in event stream".to_string()))
}
