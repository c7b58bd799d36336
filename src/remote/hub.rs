//! The agent bridge: a second listener accepting one remote browser agent.
//!
//! The hub owns the accept loop, the handshake, and the per-connection
//! receive loop that routes `response` frames back to waiting callers. At
//! most one agent connection is live at any instant; a later successful
//! handshake replaces the earlier connection and fails its in-flight calls.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::remote::frames::{AgentCommand, AuthFrame, AuthReply, CommandReply};
use crate::remote::AgentError;

/// How long a fresh connection gets to present its auth frame.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Interval between keepalive pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);
/// How long after a ping the pong must arrive.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

type PendingReply = oneshot::Sender<std::result::Result<CommandReply, AgentError>>;

/// Identity details of the connected agent, for status reporting.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Agent-chosen identifier.
    pub client_id: String,
    /// Agent user-agent string.
    pub user_agent: String,
    /// When the handshake completed.
    pub connected_at: DateTime<Utc>,
}

/// One authenticated agent connection.
///
/// Writes are funneled through a single writer task so frames are
/// serialized on the outbound transport; replies are matched to callers
/// purely by `request_id`.
pub struct AgentConnection {
    client_id: String,
    user_agent: String,
    connected_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<Message>,
    // Covers insert/remove/lookup only, never a network send.
    pending: Mutex<HashMap<Uuid, PendingReply>>,
    closed: CancellationToken,
}

impl AgentConnection {
    /// Summary of who is connected.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            client_id: self.client_id.clone(),
            user_agent: self.user_agent.clone(),
            connected_at: self.connected_at,
        }
    }

    /// Install a one-shot reply slot for `request_id`.
    pub(crate) fn install_slot(
        &self,
        request_id: Uuid,
    ) -> oneshot::Receiver<std::result::Result<CommandReply, AgentError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);
        rx
    }

    /// Remove a reply slot; a no-op when the router already consumed it.
    pub(crate) fn remove_slot(&self, request_id: &Uuid) {
        self.pending.lock().remove(request_id);
    }

    /// Queue a frame for the writer task. False when the writer is gone.
    pub(crate) fn send_frame(&self, message: Message) -> bool {
        self.outbound.send(message).is_ok()
    }

    /// Route an inbound reply to its waiting caller.
    fn fulfil(&self, reply: CommandReply) {
        let slot = self.pending.lock().remove(&reply.request_id);
        match slot {
            Some(tx) => {
                debug!(request_id = %reply.request_id, "reply routed");
                let _ = tx.send(Ok(reply));
            },
            // Stale reply: caller timed out or the call was cancelled.
            None => debug!(request_id = %reply.request_id, "dropping stale reply"),
        }
    }

    /// Fail every in-flight call with `reason` and mark the connection dead.
    fn close(&self, reason: AgentError) {
        self.closed.cancel();
        let drained: Vec<PendingReply> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, tx)| tx).collect()
        };
        for tx in drained {
            let _ = tx.send(Err(reason.clone()));
        }
    }
}

/// State shared between the hub, its connection tasks, and call sites.
pub(crate) struct HubShared {
    // Single writer (the handshake path); readers snapshot the Arc.
    active: RwLock<Option<Arc<AgentConnection>>>,
}

impl HubShared {
    pub(crate) fn connection(&self) -> Option<Arc<AgentConnection>> {
        self.active.read().clone()
    }
}

/// The agent bridge listener.
pub struct AgentHub {
    secret: String,
    handshake_timeout: Duration,
    shared: Arc<HubShared>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for AgentHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHub")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl AgentHub {
    /// Create a hub that verifies agents against `secret`.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
            shared: Arc::new(HubShared {
                active: RwLock::new(None),
            }),
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the handshake deadline (tests use a short one).
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// A call site bound to this hub's active connection.
    pub fn call_site(&self) -> super::AgentCallSite {
        super::AgentCallSite::new(self.shared.clone())
    }

    /// Whether an agent is currently connected.
    pub fn is_connected(&self) -> bool {
        self.shared.active.read().is_some()
    }

    /// Identity of the connected agent, if any.
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.shared.active.read().as_ref().map(|c| c.info())
    }

    /// Bind the bridge listener and start accepting connections.
    ///
    /// Returns the bound address (useful with port 0).
    pub async fn start(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| Error::internal(format!("cannot bind agent bridge: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| Error::internal(e.to_string()))?;
        info!(%addr, "agent bridge listening");

        let secret = self.secret.clone();
        let handshake_timeout = self.handshake_timeout;
        let shared = self.shared.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "agent connection attempt");
                            tokio::spawn(handle_connection(
                                stream,
                                secret.clone(),
                                handshake_timeout,
                                shared.clone(),
                                shutdown.clone(),
                            ));
                        },
                        Err(e) => {
                            warn!(error = %e, "agent accept failed");
                        },
                    },
                }
            }
            debug!("agent accept loop stopped");
        });

        Ok(addr)
    }

    /// Close the listener and the live connection.
    ///
    /// In-flight calls are drained with a shutting-down failure.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let conn = self.shared.active.write().take();
        if let Some(conn) = conn {
            conn.close(AgentError::ShuttingDown);
        }
        info!("agent bridge stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    secret: String,
    handshake_timeout: Duration,
    shared: Arc<HubShared>,
    shutdown: CancellationToken,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "websocket upgrade failed");
            return;
        },
    };
    let (mut sink, mut stream) = ws.split();

    let auth = match await_auth_frame(&mut stream, handshake_timeout).await {
        Ok(auth) => auth,
        Err(message) => {
            warn!(%message, "agent handshake failed");
            let _ = send_json(&mut sink, &AuthReply::failed(message)).await;
            let _ = sink.close().await;
            return;
        },
    };

    if auth.token != secret {
        warn!(client_id = %auth.client_id, "agent presented an invalid token");
        let _ = send_json(&mut sink, &AuthReply::failed("invalid token")).await;
        let _ = sink.close().await;
        return;
    }

    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let conn = Arc::new(AgentConnection {
        client_id: auth.client_id,
        user_agent: auth.user_agent,
        connected_at: Utc::now(),
        outbound,
        pending: Mutex::new(HashMap::new()),
        closed: CancellationToken::new(),
    });

    // Swap into the active slot before acknowledging, so a client that saw
    // auth_success is already the live connection. The loser's pending
    // calls fail fast.
    let previous = shared.active.write().replace(conn.clone());
    if let Some(previous) = previous {
        info!(client_id = %previous.client_id, "replacing previous agent connection");
        previous.close(AgentError::Disconnected);
    }

    if send_json(&mut sink, &AuthReply::success()).await.is_err() {
        {
            let mut active = shared.active.write();
            if active.as_ref().is_some_and(|c| Arc::ptr_eq(c, &conn)) {
                *active = None;
            }
        }
        conn.close(AgentError::Disconnected);
        return;
    }
    info!(client_id = %conn.client_id, user_agent = %conn.user_agent, "agent connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reason = receive_loop(&conn, &mut stream, &shutdown).await;

    // Drop out of the active slot only if we are still the live connection.
    {
        let mut active = shared.active.write();
        if active.as_ref().is_some_and(|c| Arc::ptr_eq(c, &conn)) {
            *active = None;
        }
    }
    conn.close(reason);
    writer.abort();
    info!(client_id = %conn.client_id, "agent disconnected");
}

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = futures_util::stream::SplitStream<WebSocketStream<TcpStream>>;

async fn send_json<T: serde::Serialize>(sink: &mut WsSink, value: &T) -> std::io::Result<()> {
    let text = serde_json::to_string(value).map_err(std::io::Error::other)?;
    sink.send(Message::text(text))
        .await
        .map_err(std::io::Error::other)
}

/// Wait for the opening `{type:"auth", ...}` frame.
async fn await_auth_frame(
    stream: &mut WsStream,
    deadline: Duration,
) -> std::result::Result<AuthFrame, String> {
    let frame = tokio::time::timeout(deadline, stream.next())
        .await
        .map_err(|_| "authentication timed out".to_string())?;

    let message = match frame {
        Some(Ok(Message::Text(text))) => text,
        Some(Ok(_)) => return Err("authentication required".to_string()),
        Some(Err(e)) => return Err(format!("transport error during handshake: {e}")),
        None => return Err("connection closed during handshake".to_string()),
    };

    let value: serde_json::Value =
        serde_json::from_str(&message).map_err(|_| "malformed auth frame".to_string())?;
    if value.get("type").and_then(|t| t.as_str()) != Some("auth") {
        return Err("authentication required".to_string());
    }
    serde_json::from_value(value).map_err(|_| "malformed auth frame".to_string())
}

/// Pump inbound frames until the connection dies, returning why it died.
async fn receive_loop(
    conn: &Arc<AgentConnection>,
    stream: &mut WsStream,
    shutdown: &CancellationToken,
) -> AgentError {
    let mut ping_timer = tokio::time::interval(PING_INTERVAL);
    ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping_timer.tick().await; // the first tick fires immediately
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    loop {
        // Copy the deadline out so the wait future does not borrow it while
        // another select arm updates it.
        let deadline = pong_deadline;
        let pong_wait = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => return AgentError::ShuttingDown,
            _ = conn.closed.cancelled() => return AgentError::Disconnected,
            _ = pong_wait => {
                warn!(client_id = %conn.client_id, "agent missed the pong deadline");
                return AgentError::Disconnected;
            },
            _ = ping_timer.tick() => {
                if !conn.send_frame(Message::Ping(Bytes::new())) {
                    return AgentError::Disconnected;
                }
                if pong_deadline.is_none() {
                    pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => route_frame(conn, &text),
                Some(Ok(Message::Pong(_))) => pong_deadline = None,
                Some(Ok(Message::Ping(data))) => {
                    let _ = conn.send_frame(Message::Pong(data));
                },
                Some(Ok(Message::Close(_))) | None => return AgentError::Disconnected,
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    warn!(error = %e, "agent transport error");
                    return AgentError::Disconnected;
                },
            },
        }
    }
}

/// Dispatch one inbound text frame.
fn route_frame(conn: &AgentConnection, text: &str) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            warn!("unparseable frame from agent");
            return;
        },
    };

    match value.get("type").and_then(|t| t.as_str()) {
        Some("response") => match serde_json::from_value::<CommandReply>(value) {
            Ok(reply) => conn.fulfil(reply),
            // Missing or malformed request_id: stale by definition.
            Err(_) => debug!("dropping response frame without a usable request_id"),
        },
        Some("event") => debug!("agent event frame ignored"),
        other => warn!(frame_type = ?other, "unknown frame type from agent"),
    }
}

/// Encode a command for the wire.
pub(crate) fn encode_command(command: &AgentCommand) -> std::result::Result<Message, AgentError> {
    serde_json::to_string(command)
        .map(Message::text)
        .map_err(|e| AgentError::Remote(format!("failed to encode command: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_connection() -> (Arc<AgentConnection>, mpsc::UnboundedReceiver<Message>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(AgentConnection {
            client_id: "A1".into(),
            user_agent: "test".into(),
            connected_at: Utc::now(),
            outbound,
            pending: Mutex::new(HashMap::new()),
            closed: CancellationToken::new(),
        });
        (conn, rx)
    }

    #[tokio::test]
    async fn reply_reaches_the_installed_slot() {
        let (conn, _rx) = test_connection();
        let id = Uuid::new_v4();
        let receiver = conn.install_slot(id);

        route_frame(
            &conn,
            &json!({"type": "response", "request_id": id, "success": true, "data": {"url": "https://example.com"}})
                .to_string(),
        );

        let reply = receiver.await.unwrap().unwrap();
        assert!(reply.success);
        assert_eq!(reply.data.unwrap()["url"], "https://example.com");
        assert!(conn.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn stale_and_malformed_replies_are_dropped() {
        let (conn, _rx) = test_connection();
        let id = Uuid::new_v4();
        let receiver = conn.install_slot(id);

        // Unknown id, missing id, wrong type, garbage: all ignored.
        route_frame(
            &conn,
            &json!({"type": "response", "request_id": Uuid::new_v4(), "success": true}).to_string(),
        );
        route_frame(&conn, &json!({"type": "response", "success": true}).to_string());
        route_frame(&conn, &json!({"type": "telemetry"}).to_string());
        route_frame(&conn, "{");

        assert_eq!(conn.pending.lock().len(), 1);
        drop(receiver);
    }

    #[tokio::test]
    async fn close_fails_every_pending_call() {
        let (conn, _rx) = test_connection();
        let rx1 = conn.install_slot(Uuid::new_v4());
        let rx2 = conn.install_slot(Uuid::new_v4());

        conn.close(AgentError::Disconnected);

        assert!(matches!(rx1.await.unwrap(), Err(AgentError::Disconnected)));
        assert!(matches!(rx2.await.unwrap(), Err(AgentError::Disconnected)));
        assert!(conn.closed.is_cancelled());
        assert!(conn.pending.lock().is_empty());
    }
}
