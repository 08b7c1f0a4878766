use super::{ApiError, ApiResult, ErrorResponse};
use crate::config::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListToolsResponse {
    pub tools: Vec<ToolInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallToolResponse {
    pub result: Value,
    /// Wall-clock seconds spent on the MCP round trip
    pub execution_time: f64,
}

/// List tools of the MCP server with form-ready parameter schemas
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Response {
    match state.mcp.list_tools().await {
        Ok(tools) => {
            let tools = tools
                .into_iter()
                .map(|tool| ToolInfo {
                    parameters: normalize_schema(tool.input_schema),
                    name: tool.name,
                    description: tool.description,
                })
                .collect();
            Json(ListToolsResponse { tools }).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list tools");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string(), "tools": [] })),
            )
                .into_response()
        }
    }
}

/// Call a tool with `{ "arguments": {...} }`
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<CallToolResponse>> {
    let tools = state.mcp.list_tools().await?;
    if !tools.iter().any(|t| t.name == name) {
        return Err(ApiError::not_found(format!("Tool '{}' not found", name)));
    }

    let arguments = normalize_arguments(arguments_from_body(&body));
    tracing::info!(tool = %name, arguments = %arguments, "Calling tool");

    let started = Instant::now();
    let result = state.mcp.call_tool(&name, arguments).await?;
    let execution_time = round_secs(started.elapsed().as_secs_f64());

    let text = result.joined_text();
    if result.is_error == Some(true) {
        tracing::warn!(tool = %name, "Tool reported an error");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::with_details("Tool execution failed", text),
        ));
    }

    Ok(Json(CallToolResponse {
        result: structured_result(text),
        execution_time,
    }))
}

/// `arguments` object of the request body; anything else means no arguments
fn arguments_from_body(body: &[u8]) -> Map<String, Value> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| match v.get("arguments") {
            Some(Value::Object(map)) => Some(map.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Drop arguments the form left blank: nulls and "null"/"none"/"" strings
pub fn normalize_arguments(arguments: Map<String, Value>) -> Value {
    let kept = arguments
        .into_iter()
        .filter(|(_, value)| match value {
            Value::Null => false,
            Value::String(s) => {
                let s = s.trim().to_lowercase();
                !(s.is_empty() || s == "null" || s == "none")
            }
            _ => true,
        })
        .collect();
    Value::Object(kept)
}

/// Coerce a tool input schema into `{type: object, properties, required}`
pub fn normalize_schema(schema: Value) -> Value {
    let Value::Object(mut schema) = schema else {
        return json!({ "type": "object", "properties": {}, "required": [] });
    };

    if !matches!(schema.get("properties"), Some(Value::Object(_))) {
        schema.insert("properties".to_string(), json!({}));
    }
    if !matches!(schema.get("required"), Some(Value::Array(_))) {
        schema.insert("required".to_string(), json!([]));
    }
    schema.insert("type".to_string(), json!("object"));

    Value::Object(schema)
}

/// Tools answer with text; JSON objects and arrays are passed on structured
fn structured_result(text: String) -> Value {
    match serde_json::from_str::<Value>(&text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::String(text),
    }
}

fn round_secs(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}
