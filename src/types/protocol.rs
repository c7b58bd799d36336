//! JSON-RPC 2.0 and MCP protocol types.
//!
//! Only the slice of the protocol this server speaks: `initialize`,
//! `tools/list` and `tools/call`, plus the response envelope shared by all
//! three.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Protocol revision advertised by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC request id: number, string, or null.
///
/// Preserved verbatim into the response; `Null` doubles as the id of
/// responses to unparseable requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
    /// Explicit `null` (or absent) id.
    Null,
}

impl Default for RequestId {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// An incoming JSON-RPC request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol marker, expected to be `"2.0"`.
    #[serde(default)]
    pub jsonrpc: String,
    /// Request id, echoed back in the response.
    #[serde(default)]
    pub id: RequestId,
    /// Method name (`initialize`, `tools/list`, `tools/call`, ...).
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
}

/// The JSON-RPC `error` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&Error> for ErrorObject {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            data: err.data(),
        }
    }
}

/// An outgoing JSON-RPC response.
///
/// Carries either `result` or `error`, never both; the two constructors are
/// the only way to build one.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Echo of the request id (`null` for unparseable requests).
    pub id: RequestId,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn failure(id: RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Server identity advertised by `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// Capability maps advertised by `initialize`.
///
/// All three are empty objects: the server publishes tools through
/// `tools/list` and implements neither resources nor prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tools capability map.
    pub tools: Map<String, Value>,
    /// Resources capability map.
    pub resources: Map<String, Value>,
    /// Prompts capability map.
    pub prompts: Map<String, Value>,
}

/// `initialize` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Negotiated protocol version.
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
    /// Server implementation info.
    pub server_info: ServerInfo,
}

impl InitializeResult {
    /// The capabilities object this server always advertises.
    pub fn current() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// Published description of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub input_schema: Value,
}

/// `tools/list` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Tools visible to the calling token, in registration order.
    pub tools: Vec<ToolInfo>,
}

/// `tools/call` parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    /// Tool to invoke.
    pub name: String,
    /// Arguments, validated by the handler against its schema.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item inside a `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Content {
    /// Text content.
    Text {
        /// The rendered text.
        text: String,
    },
}

/// `tools/call` response body.
///
/// A handler-level failure is *not* a JSON-RPC error: it travels here with
/// `is_error = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Rendered result content.
    pub content: Vec<Content>,
    /// Whether the underlying execution failed.
    pub is_error: bool,
    /// Handler-supplied metadata side-channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_id_round_trips_all_three_shapes() {
        let n: RequestId = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(n, RequestId::Number(7));
        let s: RequestId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(s, RequestId::String("abc".into()));
        let nil: RequestId = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(nil, RequestId::Null);

        assert_eq!(serde_json::to_value(RequestId::Number(7)).unwrap(), json!(7));
        assert_eq!(serde_json::to_value(RequestId::Null).unwrap(), json!(null));
    }

    #[test]
    fn absent_id_deserializes_as_null() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"tools/list"}"#).unwrap();
        assert_eq!(req.id, RequestId::Null);
        assert_eq!(req.method, "tools/list");
    }

    #[test]
    fn response_is_result_xor_error() {
        let ok = JsonRpcResponse::success(RequestId::Number(1), json!({"x": 1}));
        let v = serde_json::to_value(&ok).unwrap();
        assert!(v.get("result").is_some());
        assert!(v.get("error").is_none());

        let err = JsonRpcResponse::failure(
            RequestId::Null,
            ErrorObject {
                code: -32700,
                message: "Parse error: Invalid JSON".into(),
                data: None,
            },
        );
        let v = serde_json::to_value(&err).unwrap();
        assert!(v.get("result").is_none());
        assert_eq!(v["error"]["code"], json!(-32700));
        assert_eq!(v["id"], json!(null));
    }

    #[test]
    fn initialize_result_shape() {
        let v = serde_json::to_value(InitializeResult::current()).unwrap();
        assert_eq!(v["protocolVersion"], json!(PROTOCOL_VERSION));
        assert_eq!(v["capabilities"]["tools"], json!({}));
        assert_eq!(v["capabilities"]["resources"], json!({}));
        assert_eq!(v["capabilities"]["prompts"], json!({}));
        assert_eq!(v["serverInfo"]["name"], json!("toolgate"));
    }

    #[test]
    fn tool_info_uses_camel_case_schema_key() {
        let info = ToolInfo {
            name: "execute_shell".into(),
            description: "Run a shell command".into(),
            input_schema: json!({"type": "object"}),
        };
        let v = serde_json::to_value(&info).unwrap();
        assert!(v.get("inputSchema").is_some());
        assert!(v.get("input_schema").is_none());
    }

    #[test]
    fn call_params_default_arguments_to_null() {
        let p: CallToolParams = serde_json::from_value(json!({"name": "t"})).unwrap();
        assert_eq!(p.arguments, Value::Null);
    }
}
