//! # toolgate
//!
//! A capability-brokering server: an extensible catalog of tools published
//! over a single JSON-RPC 2.0 endpoint, with bearer-token authorization and
//! a bridge to a remote browser agent.
//!
//! Three subsystems make up the core:
//!
//! - **Registry & dispatch** ([`server`]) — the frozen tool catalog and the
//!   `POST /mcp` endpoint speaking `initialize`, `tools/list` and
//!   `tools/call`.
//! - **Token-scoped authorization** ([`auth`]) — per-token glob patterns
//!   with exclusion-first semantics, resolved into a [`auth::RequestScope`]
//!   on every request.
//! - **Remote agent bridge** ([`remote`]) — a second listener holding one
//!   long-lived WebSocket to a browser agent, driven by tool handlers
//!   through [`remote::PageFacade`] with request-id-correlated commands.
//!
//! Tool handlers return [`types::ExecutionResult`]; an application-level
//! failure sets `isError` in the response envelope and is never a JSON-RPC
//! error.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod auth;
pub mod config;
pub mod error;
pub mod remote;
pub mod server;
pub mod tools;
pub mod types;

pub use auth::{MailboxDirectory, RequestScope, TokenPolicy, TokenTable};
pub use config::Config;
pub use error::{Error, Result};
pub use remote::{AgentCallSite, AgentError, AgentHub, PageFacade};
pub use server::{AppState, ToolHandler, ToolRegistry, TypedTool};
pub use types::{ExecutionResult, PROTOCOL_VERSION};
