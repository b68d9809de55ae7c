//! The StreamableHTTP `/mcp` route (spec §4.7): `POST` carries one
//! JSON-RPC message and either initialises a session or continues an
//! existing one; `DELETE` terminates a session.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use super::jsonrpc::{error_codes, JsonRpcRequest, JsonRpcResponse};
use super::session::{McpSession, McpSessionId};
use super::tools;
use crate::auth::{self, AuthContext};
use crate::state::HubRuntime;

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
pub struct McpQuery {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

fn bearer_from(headers: &HeaderMap, query: &McpQuery) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(text) = value.to_str() {
            if let Some(token) = text.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    query.api_key.clone()
}

fn session_id_from(headers: &HeaderMap) -> Option<McpSessionId> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

async fn resolve_auth(runtime: &HubRuntime, headers: &HeaderMap, query: &McpQuery) -> Result<AuthContext, Response> {
    let Some(bearer) = bearer_from(headers, query) else {
        return Err((StatusCode::UNAUTHORIZED, "missing bearer credential").into_response());
    };
    auth::resolve_bearer_auth(runtime.persistence.as_ref(), runtime.mcp_auth.as_ref(), &bearer)
        .await
        .map_err(|_| (StatusCode::UNAUTHORIZED, "invalid or unrecognised bearer credential").into_response())
}

/// `POST /mcp`: initialises a session when no `Mcp-Session-Id` header is
/// present, otherwise continues the session it names.
pub async fn post(
    State(runtime): State<Arc<HubRuntime>>,
    Query(query): Query<McpQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                axum::Json(JsonRpcResponse::error(Value::Null, error_codes::PARSE_ERROR, err.to_string())),
            )
                .into_response();
        }
    };

    let existing_session_id = session_id_from(&headers);

    let (session_id, auth, is_new) = if let Some(id) = existing_session_id {
        match runtime.mcp_sessions.get(&id) {
            Some(entry) => {
                entry.touch();
                (id, entry.auth.clone(), false)
            }
            None => {
                return (StatusCode::NOT_FOUND, "unknown MCP session").into_response();
            }
        }
    } else {
        match resolve_auth(&runtime, &headers, &query).await {
            Ok(auth) => {
                let id = McpSessionId::new();
                runtime.mcp_sessions.insert(id.clone(), McpSession::new(auth.clone()));
                (id, auth, true)
            }
            Err(response) => return response,
        }
    };

    if request.is_notification() {
        // `notifications/initialized` and friends: acknowledged, no body.
        return StatusCode::ACCEPTED.into_response();
    }

    let id = request.id.clone().unwrap_or(Value::Null);
    let rpc_response = dispatch(&runtime, &auth, &request).await;

    let mut response = (StatusCode::OK, axum::Json(match rpc_response {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err((code, message)) => JsonRpcResponse::error(id, code, message),
    }))
        .into_response();

    if is_new {
        if let Ok(value) = session_id.to_string().parse() {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    response
}

/// `DELETE /mcp`: terminates the session named by `Mcp-Session-Id`.
pub async fn delete(State(runtime): State<Arc<HubRuntime>>, headers: HeaderMap) -> Response {
    match session_id_from(&headers) {
        Some(id) => {
            runtime.mcp_sessions.remove(&id);
            StatusCode::NO_CONTENT.into_response()
        }
        None => (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id header").into_response(),
    }
}

async fn dispatch(runtime: &HubRuntime, auth: &AuthContext, request: &JsonRpcRequest) -> Result<Value, (i64, String)> {
    match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "sonde-hub", "version": env!("CARGO_PKG_VERSION")},
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": tools::descriptors() })),
        "tools/call" => {
            let name = request
                .params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| (error_codes::INVALID_PARAMS, "missing tool name".to_string()))?;
            let args = request.params.get("arguments").cloned().unwrap_or(Value::Null);
            let result = tools::call(runtime, auth, name, args).await;
            Ok(json!({ "content": result.content, "isError": result.is_error }))
        }
        other => Err((error_codes::METHOD_NOT_FOUND, format!("unknown method '{other}'"))),
    }
}
