//! The remote agent bridge.
//!
//! A remote browser agent dials in over a long-lived WebSocket on a
//! dedicated port, authenticates with a shared secret, and thereafter
//! executes browser commands on the server's behalf. [`AgentHub`] owns the
//! connection, [`AgentCallSite`] correlates commands with replies, and
//! [`PageFacade`] is the typed surface tool handlers actually use.

pub mod call;
pub mod frames;
pub mod hub;
pub mod page;

use std::time::Duration;

pub use call::AgentCallSite;
pub use hub::{AgentHub, ConnectionInfo};
pub use page::{ElementFacade, PageFacade};

/// Failures of an agent-bound call.
///
/// These never become JSON-RPC errors. A tool handler that hits one reports
/// it inside its [`ExecutionResult`](crate::types::ExecutionResult) with the
/// matching [`kind`](Self::kind).
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// No agent is connected.
    #[error("no remote browser agent connected")]
    NoAgent,
    /// No reply arrived within the deadline.
    #[error("remote agent command timed out after {0:?}")]
    Timeout(Duration),
    /// The agent replied with `success: false`.
    #[error("remote agent reported failure: {0}")]
    Remote(String),
    /// The connection dropped (or was replaced) before the reply.
    #[error("remote agent disconnected before replying")]
    Disconnected,
    /// The bridge is stopping.
    #[error("agent bridge is shutting down")]
    ShuttingDown,
}

impl AgentError {
    /// The `error_kind` string reported through `ExecutionResult`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "TimeoutError",
            Self::Remote(_) => "RemoteError",
            Self::NoAgent | Self::Disconnected | Self::ShuttingDown => "Disconnected",
        }
    }
}
