//! End-to-end tests of the agent bridge, using a WebSocket test double in
//! place of the real browser agent.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use toolgate::auth::RequestScope;
use toolgate::config::Config;
use toolgate::remote::{AgentError, AgentHub, PageFacade};
use toolgate::server::ToolRegistry;
use toolgate::tools::{web_browser, ToolContext};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "bridge-secret";

async fn start_hub() -> (Arc<AgentHub>, SocketAddr) {
    let hub = Arc::new(AgentHub::new(SECRET));
    let addr = hub.start("127.0.0.1", 0).await.unwrap();
    (hub, addr)
}

async fn raw_connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();
    ws
}

/// Handshake as a well-behaved agent and assert success.
async fn connect_agent(addr: SocketAddr, client_id: &str) -> WsClient {
    let mut ws = raw_connect(addr).await;
    ws.send(Message::text(
        json!({
            "type": "auth",
            "token": SECRET,
            "client_id": client_id,
            "user_agent": "test-double/1.0",
            "timestamp": "2026-08-01T00:00:00Z"
        })
        .to_string(),
    ))
    .await
    .unwrap();

    let reply = next_text(&mut ws).await.expect("auth reply");
    assert_eq!(reply["type"], "auth_success");
    ws
}

/// Next JSON text frame, skipping keepalive traffic.
async fn next_text(ws: &mut WsClient) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")?;
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Read one command frame and answer it with `data`.
async fn answer_next_command(ws: &mut WsClient, data: Value) -> Value {
    let frame = next_text(ws).await.expect("command frame");
    assert_eq!(frame["type"], "command");
    ws.send(Message::text(
        json!({
            "type": "response",
            "request_id": frame["request_id"],
            "success": true,
            "data": data
        })
        .to_string(),
    ))
    .await
    .unwrap();
    frame
}

#[tokio::test]
async fn round_trip_command_and_reply() {
    let (hub, addr) = start_hub().await;
    let mut agent = connect_agent(addr, "A1").await;
    assert!(hub.is_connected());
    assert_eq!(hub.connection_info().unwrap().client_id, "A1");

    let page = PageFacade::new(hub.call_site());
    let double = tokio::spawn(async move {
        let frame = answer_next_command(&mut agent, json!({"url": "https://example.com"})).await;
        assert_eq!(frame["action"], "get_url");
        agent
    });

    let url = page.url().await.unwrap();
    assert_eq!(url, "https://example.com");
    double.await.unwrap();
    hub.stop().await;
}

#[tokio::test]
async fn web_tool_reports_the_agent_answer_in_metadata() {
    let (hub, addr) = start_hub().await;
    let mut agent = connect_agent(addr, "A1").await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = ToolContext {
        config: Arc::new(Config::for_tests(dir.path().to_path_buf())),
        page: PageFacade::new(hub.call_site()),
    };
    let mut registry = ToolRegistry::new();
    web_browser::register(&mut registry, &ctx).unwrap();

    let double = tokio::spawn(async move {
        answer_next_command(&mut agent, json!({"url": "https://example.com"})).await;
        agent
    });

    let result = registry
        .invoke("web_get_url", json!({}), RequestScope::allow_all())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.metadata["url"], json!("https://example.com"));

    double.await.unwrap();
    hub.stop().await;
}

#[tokio::test]
async fn unanswered_command_times_out_within_bounds() {
    let (hub, addr) = start_hub().await;
    let _agent = connect_agent(addr, "A1").await;

    let calls = hub.call_site();
    let started = Instant::now();
    let err = calls
        .send("get_url", json!({}), Duration::from_millis(300))
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Timeout(_)));
    assert_eq!(err.kind(), "TimeoutError");
    assert!(started.elapsed() < Duration::from_secs(2));
    hub.stop().await;
}

#[tokio::test]
async fn late_reply_after_timeout_is_discarded_and_harmless() {
    let (hub, addr) = start_hub().await;
    let mut agent = connect_agent(addr, "A1").await;
    let calls = hub.call_site();

    // First call times out; capture its request id without answering.
    let pending = tokio::spawn({
        let calls = calls.clone();
        async move { calls.send("get_url", json!({}), Duration::from_millis(200)).await }
    });
    let frame = next_text(&mut agent).await.expect("command frame");
    assert!(matches!(pending.await.unwrap(), Err(AgentError::Timeout(_))));

    // The stale reply lands after the slot is gone.
    agent
        .send(Message::text(
            json!({
                "type": "response",
                "request_id": frame["request_id"],
                "success": true,
                "data": {"url": "https://stale.example"}
            })
            .to_string(),
        ))
        .await
        .unwrap();

    // The connection is still healthy for the next call.
    let double = tokio::spawn(async move {
        answer_next_command(&mut agent, json!({"url": "https://fresh.example"})).await;
        agent
    });
    let data = calls
        .send("get_url", json!({}), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(data["url"], "https://fresh.example");

    double.await.unwrap();
    hub.stop().await;
}

#[tokio::test]
async fn replacement_fails_in_flight_calls_and_routes_to_the_new_agent() {
    let (hub, addr) = start_hub().await;
    let mut first = connect_agent(addr, "A1").await;
    let calls = hub.call_site();

    // A1 has one in-flight call it will never answer.
    let in_flight = tokio::spawn({
        let calls = calls.clone();
        async move { calls.send("get_url", json!({}), Duration::from_secs(10)).await }
    });
    // Wait for the command to reach A1 so the slot is installed.
    let frame = next_text(&mut first).await.expect("command frame");
    assert_eq!(frame["type"], "command");

    // A2 completes a handshake: A1 is replaced on the spot.
    let mut second = connect_agent(addr, "A2").await;
    assert_eq!(hub.connection_info().unwrap().client_id, "A2");

    // The in-flight call fails fast with a disconnect, not a timeout.
    let outcome = tokio::time::timeout(Duration::from_secs(2), in_flight)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, Err(AgentError::Disconnected)));

    // A1's socket is closed by the server.
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match first.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "replaced connection should be closed");

    // New calls reach A2.
    let double = tokio::spawn(async move {
        answer_next_command(&mut second, json!({"url": "https://second.example"})).await;
        second
    });
    let data = calls
        .send("get_url", json!({}), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(data["url"], "https://second.example");

    double.await.unwrap();
    hub.stop().await;
}

#[tokio::test]
async fn wrong_token_is_rejected_with_auth_failed() {
    let (hub, addr) = start_hub().await;
    let mut ws = raw_connect(addr).await;
    ws.send(Message::text(
        json!({"type": "auth", "token": "wrong", "client_id": "X"}).to_string(),
    ))
    .await
    .unwrap();

    let reply = next_text(&mut ws).await.expect("auth reply");
    assert_eq!(reply["type"], "auth_failed");
    assert_eq!(next_text(&mut ws).await, None);
    assert!(!hub.is_connected());
    hub.stop().await;
}

#[tokio::test]
async fn non_auth_first_frame_is_rejected() {
    let (hub, addr) = start_hub().await;
    let mut ws = raw_connect(addr).await;
    ws.send(Message::text(json!({"type": "response", "request_id": "x"}).to_string()))
        .await
        .unwrap();

    let reply = next_text(&mut ws).await.expect("auth reply");
    assert_eq!(reply["type"], "auth_failed");
    assert!(!hub.is_connected());
    hub.stop().await;
}

#[tokio::test]
async fn silent_connection_is_closed_after_the_handshake_deadline() {
    let hub = Arc::new(AgentHub::new(SECRET).with_handshake_timeout(Duration::from_millis(200)));
    let addr = hub.start("127.0.0.1", 0).await.unwrap();

    let mut ws = raw_connect(addr).await;
    // Say nothing; the server must give up on us.
    let reply = next_text(&mut ws).await.expect("auth reply");
    assert_eq!(reply["type"], "auth_failed");
    assert_eq!(next_text(&mut ws).await, None);
    assert!(!hub.is_connected());
    hub.stop().await;
}

#[tokio::test]
async fn stop_drains_pending_calls_with_shutting_down() {
    let (hub, addr) = start_hub().await;
    let mut agent = connect_agent(addr, "A1").await;
    let calls = hub.call_site();

    let in_flight = tokio::spawn({
        let calls = calls.clone();
        async move { calls.send("get_url", json!({}), Duration::from_secs(10)).await }
    });
    let frame = next_text(&mut agent).await.expect("command frame");
    assert_eq!(frame["type"], "command");

    hub.stop().await;

    let outcome = tokio::time::timeout(Duration::from_secs(2), in_flight)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, Err(AgentError::ShuttingDown)));
    assert!(!hub.is_connected());

    // And with nothing connected, new sends fail immediately.
    let err = calls
        .send("get_url", json!({}), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::NoAgent));
}
