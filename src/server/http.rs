//! The JSON-RPC 2.0 HTTP surface.
//!
//! `POST /mcp` runs four phases: authorize, parse, dispatch, encode. The
//! permission filter sits in the dispatch phase; the registry itself never
//! checks anything. `GET /mcp` is the health probe, behind the same auth.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{HeaderValue, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::auth::{self, RequestScope};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::server::registry::ToolRegistry;
use crate::types::{
    CallToolParams, ErrorObject, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, RequestId, PROTOCOL_VERSION,
};

/// Shared state behind the HTTP routes.
#[derive(Clone)]
pub struct AppState {
    /// The frozen tool catalog.
    pub registry: Arc<ToolRegistry>,
    /// Process configuration.
    pub config: Arc<Config>,
}

/// Build the axum router serving `/mcp`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(mcp_post).get(mcp_get))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Phase 1 failure: emit the auth error envelope with its HTTP status.
fn auth_failure(err: &Error) -> Response {
    let status = err.http_status();
    let body = JsonRpcResponse::failure(RequestId::Null, ErrorObject::from(err));
    let mut response = (status, Json(body)).into_response();
    if status == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Authorize before even looking at the body.
    let scope = match auth::authorize(&headers, &state.config.tokens, &state.config.mailboxes) {
        Ok(scope) => scope,
        Err(err) => return auth_failure(&err),
    };
    // Client hang-up drops this future; the guard turns that into a
    // cancellation signal handlers can observe.
    let _cancelled_on_drop = scope.cancellation.clone().drop_guard();

    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            warn!("request body failed to parse");
            return Json(JsonRpcResponse::failure(
                RequestId::Null,
                ErrorObject::from(&Error::Parse),
            ))
            .into_response();
        },
    };

    let id = request.id.clone();
    let response = match dispatch(&state, scope, &request).await {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(err) => {
            if matches!(err, Error::Internal(_)) {
                // Printable form only; nothing internal leaks to the client.
                warn!(method = %request.method, error = %err, "request failed");
            }
            JsonRpcResponse::failure(id, ErrorObject::from(&err))
        },
    };
    Json(response).into_response()
}

/// Phase 3: branch on the method.
async fn dispatch(
    state: &AppState,
    scope: RequestScope,
    request: &JsonRpcRequest,
) -> Result<Value> {
    match request.method.as_str() {
        "initialize" => to_value(InitializeResult::current()),
        "tools/list" => {
            let all = state.registry.definitions();
            let tools = scope.policy.filter(&all).into_iter().cloned().collect();
            to_value(ListToolsResult { tools })
        },
        "tools/call" => handle_tools_call(state, scope, request.params.clone()).await,
        other => Err(Error::MethodNotFound(other.to_string())),
    }
}

async fn handle_tools_call(
    state: &AppState,
    scope: RequestScope,
    params: Option<Value>,
) -> Result<Value> {
    let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| Error::validation(e.to_string()))?;

    if !scope.policy.can_invoke(&params.name) {
        warn!(tool = %params.name, "permission denied");
        return Err(Error::PermissionDenied { tool: params.name });
    }

    // Absent arguments mean an empty object, as every handler expects.
    let arguments = if params.arguments.is_null() {
        json!({})
    } else {
        params.arguments
    };
    let result = state
        .registry
        .invoke(&params.name, arguments, scope)
        .await?;
    info!(tool = %params.name, success = result.success, "tool call finished");
    to_value(result.into_call_result())
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::internal(e.to_string()))
}

/// Health probe. Same auth as the RPC surface.
async fn mcp_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(err) = auth::authorize(&headers, &state.config.tokens, &state.config.mailboxes) {
        return auth_failure(&err);
    }

    let config = &state.config;
    let scratch_files = count_scratch_files(config);
    let auth_required = !config.tokens.is_empty();

    Json(json!({
        "status": "ok",
        "authenticated": true,
        "protocol": format!("MCP {PROTOCOL_VERSION}"),
        "version": env!("CARGO_PKG_VERSION"),
        "tools_loaded": state.registry.len(),
        "security": {
            "api_key_required": auth_required,
            "api_keys_count": config.tokens.len(),
            "auth_method": if auth_required {
                "Authorization: Bearer <token>"
            } else {
                "None (Development Mode)"
            },
        },
        "runtime": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "family": std::env::consts::FAMILY,
        },
        "config": {
            "work_directory": config.work_dir.display().to_string(),
            "exec_timeout": config.exec_timeout.as_secs(),
            "max_output_length": config.max_output,
        },
        "stats": { "scratch_files": scratch_files },
    }))
    .into_response()
}

fn count_scratch_files(config: &Config) -> usize {
    std::fs::read_dir(&config.work_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| {
                    let name = e.file_name();
                    let name = name.to_string_lossy();
                    name.starts_with("exec_") && name.ends_with(".py")
                })
                .count()
        })
        .unwrap_or(0)
}
