// MCP server: transport-agnostic JSON-RPC dispatch over the tool registry

use crate::protocol::{
    CallToolParams, CallToolResult, ClientInfo, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerCapabilities, ServerInfo, ToolsCapability,
};
use crate::tools::ToolRegistry;
use crate::{PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Reply to one incoming message: a single response or a batch
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum McpReply {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

pub struct McpServer {
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle a decoded JSON message (single request or batch). Returns
    /// `None` when nothing must be sent back, e.g. for notifications.
    pub async fn handle_message(&self, message: Value) -> Option<McpReply> {
        match message {
            Value::Array(items) if items.is_empty() => Some(McpReply::Single(
                JsonRpcResponse::error(Value::Null, JsonRpcError::invalid_request("Empty batch")),
            )),
            Value::Array(items) => {
                let mut responses = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(response) = self.handle_value(item).await {
                        responses.push(response);
                    }
                }
                (!responses.is_empty()).then_some(McpReply::Batch(responses))
            }
            other => self.handle_value(other).await.map(McpReply::Single),
        }
    }

    /// Handle raw text, mapping undecodable input to a parse error
    pub async fn handle_text(&self, text: &str) -> Option<McpReply> {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                error!(error = %e, "Parse error");
                Some(McpReply::Single(JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::parse_error(e.to_string()),
                )))
            }
        }
    }

    async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request(format!("Invalid Request: {}", e)),
            )),
        }
    }

    /// Handle an MCP request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "Handling MCP request");

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id.unwrap_or(Value::Null),
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        if request.is_notification() {
            match request.method.as_str() {
                "notifications/initialized" | "initialized" => debug!("Client initialized"),
                "notifications/cancelled" => debug!("Client cancelled a request"),
                other => debug!(method = other, "Ignoring notification"),
            }
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params.as_ref()),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn handle_initialize(&self, params: Option<&Value>) -> Result<Value, JsonRpcError> {
        let client = params
            .and_then(|p| p.get("clientInfo"))
            .and_then(|ci| serde_json::from_value::<ClientInfo>(ci.clone()).ok())
            .unwrap_or_default();
        let requested = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);

        info!(
            client = %client.name,
            version = %client.version,
            protocol = requested,
            "Client connected"
        );

        to_result(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        })
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        to_result(ListToolsResult {
            tools: self.registry.list_schemas(),
        })
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)))?;

        let tool = self
            .registry
            .get(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name)))?;

        let started = Instant::now();
        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let result = match tool.execute(arguments).await {
            Ok(result) => {
                info!(
                    tool = %params.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call finished"
                );
                result
            }
            Err(e) => {
                warn!(tool = %params.name, error = %format!("{:#}", e), "Tool call failed");
                CallToolResult::error(format!("{:#}", e))
            }
        };

        to_result(result)
    }
}

fn to_result(value: impl Serialize) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
