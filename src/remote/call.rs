//! Correlated command dispatch against the connected agent.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::remote::frames::AgentCommand;
use crate::remote::hub::{encode_command, AgentConnection, HubShared};
use crate::remote::AgentError;

/// Issues commands to whichever agent is currently connected.
///
/// Cheap to clone; every [`send`](Self::send) snapshots the active
/// connection, so calls started before a replacement finish (or fail)
/// against the connection they were sent on.
#[derive(Clone)]
pub struct AgentCallSite {
    shared: Arc<HubShared>,
}

impl std::fmt::Debug for AgentCallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCallSite").finish()
    }
}

impl AgentCallSite {
    pub(crate) fn new(shared: Arc<HubShared>) -> Self {
        Self { shared }
    }

    /// Send a command and await its correlated reply.
    ///
    /// The pending slot installed for the command is released on every exit
    /// path, including cancellation of the returned future: a guard removes
    /// it on drop, so late replies after a timeout are discarded as stale.
    pub async fn send(
        &self,
        action: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, AgentError> {
        let conn = self.shared.connection().ok_or(AgentError::NoAgent)?;

        let command = AgentCommand::new(action, params);
        let request_id = command.request_id;
        let frame = encode_command(&command)?;

        let receiver = conn.install_slot(request_id);
        let _slot = SlotGuard {
            conn: &conn,
            request_id,
        };

        if !conn.send_frame(frame) {
            return Err(AgentError::Disconnected);
        }
        debug!(action, %request_id, "command dispatched");

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(Ok(reply))) => {
                if reply.success {
                    Ok(reply.data.unwrap_or_else(|| json!({})))
                } else {
                    Err(AgentError::Remote(
                        reply.error.unwrap_or_else(|| "unknown error".to_string()),
                    ))
                }
            },
            // Connection teardown reported a specific failure.
            Ok(Ok(Err(failure))) => Err(failure),
            // Sender dropped without a verdict: the connection died.
            Ok(Err(_)) => Err(AgentError::Disconnected),
            Err(_) => {
                debug!(action, %request_id, "command timed out");
                Err(AgentError::Timeout(timeout))
            },
        }
    }
}

/// Removes the pending slot when the call unwinds, however it unwinds.
struct SlotGuard<'a> {
    conn: &'a Arc<AgentConnection>,
    request_id: Uuid,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.conn.remove_slot(&self.request_id);
    }
}
