//! Protocol-layer error types.
//!
//! Everything in this module maps onto the JSON-RPC `error` object. Failures
//! that happen *inside* a tool handler are a different animal: they are
//! reported through [`ExecutionResult`](crate::types::ExecutionResult) with
//! `success = false` and never reach this type.

use serde_json::{json, Value};

/// JSON-RPC error codes used on the wire.
pub mod code {
    /// The request body was not valid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Unknown method or unknown tool.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Handler rejected its arguments.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal failure, including permission denial.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Missing or malformed `Authorization` header.
    pub const MISSING_AUTH: i32 = -32000;
    /// Other HTTP-derived error (e.g. unknown bearer token).
    pub const HTTP_ERROR: i32 = -32001;
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// RPC-layer errors, serialized into the JSON-RPC `error` object.
///
/// The server never retries any of these; the client decides what to do.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request body was not valid JSON.
    #[error("Parse error: Invalid JSON")]
    Parse,

    /// The `method` field names nothing we serve.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// `tools/call` named a tool that is not registered.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments failed validation before or during handler dispatch.
    #[error("Invalid params: {0}")]
    Validation(String),

    /// The token's policy does not allow this tool.
    #[error("Permission denied: Tool '{tool}' is not allowed for this API Key")]
    PermissionDenied {
        /// Name of the denied tool, echoed in `error.data.tool`.
        tool: String,
    },

    /// `Authorization` header absent or not of the `Bearer <token>` shape.
    #[error("{0}")]
    MissingAuth(String),

    /// Bearer token not present in the configured token table.
    #[error("Invalid API Key")]
    InvalidToken,

    /// A tool name was registered twice during bootstrap.
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    /// Any other HTTP-derived failure outside the JSON-RPC method space.
    #[error("{0}")]
    Other(String),

    /// Anything else that escaped a handler.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an HTTP-derived error outside the JSON-RPC method space.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Missing-auth error with the canonical "no header" message.
    pub fn missing_auth_header() -> Self {
        Self::MissingAuth(
            "Missing Authorization Header. Expected format: 'Authorization: Bearer <token>'"
                .to_string(),
        )
    }

    /// Missing-auth error with the canonical "bad shape" message.
    pub fn malformed_auth_header() -> Self {
        Self::MissingAuth("Invalid Authorization format. Expected 'Bearer <token>'".to_string())
    }

    /// The JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse => code::PARSE_ERROR,
            Self::MethodNotFound(_) | Self::ToolNotFound(_) => code::METHOD_NOT_FOUND,
            Self::Validation(_) => code::INVALID_PARAMS,
            Self::PermissionDenied { .. } | Self::DuplicateTool(_) | Self::Internal(_) => {
                code::INTERNAL_ERROR
            },
            Self::MissingAuth(_) => code::MISSING_AUTH,
            Self::InvalidToken | Self::Other(_) => code::HTTP_ERROR,
        }
    }

    /// HTTP status carried by the response envelope.
    ///
    /// JSON-RPC-layer failures ride a 200; only the auth and HTTP-derived
    /// failures get a real HTTP status, matching `WWW-Authenticate`
    /// semantics.
    pub fn http_status(&self) -> http::StatusCode {
        match self {
            Self::MissingAuth(_) => http::StatusCode::UNAUTHORIZED,
            Self::InvalidToken => http::StatusCode::FORBIDDEN,
            Self::Other(_) => http::StatusCode::BAD_REQUEST,
            _ => http::StatusCode::OK,
        }
    }

    /// Structured `error.data`, when this error carries any.
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::PermissionDenied { tool } => Some(json!({ "tool": tool })),
            Self::MissingAuth(_) => Some(json!({ "status_code": 401 })),
            Self::InvalidToken => Some(json!({ "status_code": 403 })),
            Self::Other(_) => Some(json!({ "status_code": 400 })),
            _ => None,
        }
    }
}
