//! Push-channel behavior against an in-process WebSocket server: the auth
//! handshake, scope joins, and reconnection after transport loss.

use futures_util::{SinkExt, StreamExt};
use resto_link::{
    ConnectionOptions, RestoLinkClient, RestoLinkTimeouts, Scope, Session,
};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

type ServerSocket = tokio_tungstenite::WebSocketStream<TcpStream>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn session() -> Session {
    Session {
        user_id: "u1".to_string(),
        tenant_id: "t1".to_string(),
        token: "token-u1".to_string(),
        refresh_token: None,
        token_expiry_ms: None,
        restaurant_ids: vec!["r1".to_string()],
    }
}

/// Accept one connection, answer the auth handshake, and read frames until
/// `expected` joins arrived. Returns the socket and the joined rooms.
async fn accept_and_collect_joins(
    listener: &TcpListener,
    expected: usize,
) -> (ServerSocket, Vec<String>) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    let mut rooms = Vec::new();
    while rooms.len() < expected {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("client frame within the window")
            .expect("stream stays open")
            .unwrap();
        let text = match frame {
            Message::Text(text) => text,
            _ => continue,
        };
        let v: Value = serde_json::from_str(&text).unwrap();
        match v["event"].as_str() {
            Some("authenticate") => {
                assert_eq!(v["token"], "token-u1");
                assert_eq!(v["userId"], "u1");
                let reply = json!({"event": "auth:success", "userId": "u1"}).to_string();
                ws.send(Message::Text(reply.into())).await.unwrap();
            }
            Some("join") => {
                rooms.push(v["room"].as_str().unwrap().to_string());
            }
            other => panic!("unexpected client event: {:?}", other),
        }
    }
    (ws, rooms)
}

/// Read frames for `window`, returning any further join rooms.
async fn extra_joins(ws: &mut ServerSocket, window: Duration) -> Vec<String> {
    let mut rooms = Vec::new();
    while let Ok(Some(Ok(frame))) = tokio::time::timeout(window, ws.next()).await {
        if let Message::Text(text) = frame {
            let v: Value = serde_json::from_str(&text).unwrap();
            if v["event"] == "join" {
                rooms.push(v["room"].as_str().unwrap().to_string());
            }
        }
    }
    rooms
}

/// Dropping the transport makes the client back off, redial, re-authenticate,
/// and re-join every tracked scope exactly once per connection.
#[tokio::test]
async fn reconnect_rejoins_each_scope_exactly_once() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let client = RestoLinkClient::builder()
        .base_url(format!("http://127.0.0.1:{}", port))
        .connection_options(ConnectionOptions::default().with_reconnect_base_delay_ms(50))
        .timeouts(
            RestoLinkTimeouts::builder()
                .keepalive_interval(Duration::ZERO)
                .build(),
        )
        .build()
        .unwrap();

    client.join_scope(Scope::restaurant("r1"));
    client.join_scope(Scope::user("u1"));
    client.session_store().set_session(Some(session()));

    // First connection: handshake, then one join per tracked scope.
    let (mut ws, mut rooms) = accept_and_collect_joins(&listener, 2).await;
    rooms.sort();
    assert_eq!(rooms, vec!["restaurant:r1", "user:u1"]);
    assert!(
        extra_joins(&mut ws, Duration::from_millis(200)).await.is_empty(),
        "a live connection must not see duplicate joins"
    );
    assert!(client.is_connected());

    // Kill the transport without a close frame; the client treats this as a
    // transport failure and redials after backoff.
    drop(ws);

    let (mut ws2, mut rooms2) = accept_and_collect_joins(&listener, 2).await;
    rooms2.sort();
    assert_eq!(rooms2, vec!["restaurant:r1", "user:u1"], "scope membership survives reconnect");
    assert!(
        extra_joins(&mut ws2, Duration::from_millis(200)).await.is_empty(),
        "re-join happens once per scope, not once per source"
    );
    assert!(client.is_connected());

    client.shutdown().await;
}

/// A scope released while disconnected is not re-joined after reconnect.
#[tokio::test]
async fn scope_left_while_down_is_not_rejoined() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let client = RestoLinkClient::builder()
        .base_url(format!("http://127.0.0.1:{}", port))
        .connection_options(ConnectionOptions::default().with_reconnect_base_delay_ms(50))
        .timeouts(
            RestoLinkTimeouts::builder()
                .keepalive_interval(Duration::ZERO)
                .build(),
        )
        .build()
        .unwrap();

    client.join_scope(Scope::restaurant("r1"));
    client.join_scope(Scope::kitchen("r1"));
    client.session_store().set_session(Some(session()));

    let (ws, mut rooms) = accept_and_collect_joins(&listener, 2).await;
    rooms.sort();
    assert_eq!(rooms, vec!["kitchen:r1", "restaurant:r1"]);

    drop(ws);
    // While the connection is down, the kitchen view goes away.
    client.leave_scope(&Scope::kitchen("r1"));

    let (mut ws2, rooms2) = accept_and_collect_joins(&listener, 1).await;
    assert_eq!(rooms2, vec!["restaurant:r1"]);
    assert!(
        extra_joins(&mut ws2, Duration::from_millis(200)).await.is_empty(),
        "released scope must stay left"
    );

    client.shutdown().await;
}
