//! The JSON-RPC server: tool catalog plus HTTP dispatch.

pub mod http;
pub mod registry;

pub use http::{router, AppState};
pub use registry::{HandlerFuture, ToolDefinition, ToolHandler, ToolRegistry, TypedTool};
