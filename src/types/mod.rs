//! Core protocol and result types.

pub mod protocol;
pub mod result;

pub use protocol::{
    CallToolParams, CallToolResult, Content, ErrorObject, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, RequestId, ServerCapabilities, ServerInfo, ToolInfo,
    PROTOCOL_VERSION,
};
pub use result::{elapsed_label, ExecutionResult};
