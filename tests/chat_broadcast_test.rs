// End-to-end chat broadcast tests over real WebSocket connections.
//
// Each test boots the chat router on 127.0.0.1:0 and connects clients with
// tokio-tungstenite. Registration happens after the upgrade completes, so
// tests wait for the registry to reach the expected size before sending.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::{SinkExt, StreamExt};
use gameroom::api::{create_chat_router, ChatAppState};
use gameroom::chat::{ChatConfig, ChatHub, ChatMessage};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot the chat router and return the ws URL plus the hub for inspection.
async fn boot_server(config: ChatConfig) -> (String, ChatHub) {
    let (hub, _relay_task) = ChatHub::start(&config);
    let app = create_chat_router(ChatAppState { hub: hub.clone() });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{}/websocket", addr), hub)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn wait_for_connections(hub: &ChatHub, expected: usize) {
    timeout(TIMEOUT, async {
        while hub.registry.len() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {} connections, registry has {}",
            expected,
            hub.registry.len()
        )
    });
}

async fn send_chat(ws: &mut WsStream, username: &str, message: &str) {
    let payload = json!({"username": username, "message": message});
    ws.send(Message::Text(payload.to_string())).await.unwrap();
}

/// Read the next text frame as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// True if a text frame arrives within `window`.
async fn receives_within(ws: &mut WsStream, window: Duration) -> bool {
    loop {
        match timeout(window, ws.next()).await {
            Err(_) => return false,
            Ok(Some(Ok(Message::Text(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
            Ok(_) => return false,
        }
    }
}

#[tokio::test]
async fn test_three_clients_sender_not_echoed() {
    let (url, hub) = boot_server(ChatConfig::default()).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let mut c = connect(&url).await;
    wait_for_connections(&hub, 3).await;

    send_chat(&mut a, "a", "hi").await;

    let expected = json!({"username": "a", "message": "hi"});
    assert_eq!(read_json(&mut b).await, expected);
    assert_eq!(read_json(&mut c).await, expected);
    assert!(!receives_within(&mut a, Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_three_clients_sender_echoed_when_enabled() {
    let config = ChatConfig {
        echo_to_sender: true,
        ..ChatConfig::default()
    };
    let (url, hub) = boot_server(config).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let mut c = connect(&url).await;
    wait_for_connections(&hub, 3).await;

    send_chat(&mut a, "a", "hi").await;

    let expected = json!({"username": "a", "message": "hi"});
    assert_eq!(read_json(&mut a).await, expected);
    assert_eq!(read_json(&mut b).await, expected);
    assert_eq!(read_json(&mut c).await, expected);
}

#[tokio::test]
async fn test_messages_arrive_in_send_order() {
    let (url, hub) = boot_server(ChatConfig::default()).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    wait_for_connections(&hub, 2).await;

    for i in 0..10 {
        send_chat(&mut a, "a", &format!("m{}", i)).await;
    }

    for i in 0..10 {
        let msg: ChatMessage = serde_json::from_value(read_json(&mut b).await).unwrap();
        assert_eq!(msg.message, format!("m{}", i));
    }
}

#[tokio::test]
async fn test_disconnected_client_is_removed() {
    let (url, hub) = boot_server(ChatConfig::default()).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let mut c = connect(&url).await;
    wait_for_connections(&hub, 3).await;

    c.close(None).await.unwrap();
    drop(c);
    wait_for_connections(&hub, 2).await;

    send_chat(&mut a, "a", "still here?").await;
    let msg = read_json(&mut b).await;
    assert_eq!(msg["message"], "still here?");
    assert_eq!(hub.registry.len(), 2);
}

#[tokio::test]
async fn test_malformed_payload_drops_only_that_client() {
    let (url, hub) = boot_server(ChatConfig::default()).await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    wait_for_connections(&hub, 2).await;

    b.send(Message::Text("not json".to_string())).await.unwrap();
    wait_for_connections(&hub, 1).await;

    // b's write half was closed by the server
    assert!(!receives_within(&mut b, Duration::from_millis(200)).await);

    let mut c = connect(&url).await;
    wait_for_connections(&hub, 2).await;
    send_chat(&mut c, "c", "hello a").await;
    assert_eq!(read_json(&mut a).await["message"], "hello a");
}

#[tokio::test]
async fn test_stats_endpoint_counts_relayed_messages() {
    let (hub, _relay_task) = ChatHub::start(&ChatConfig::default());
    let app = create_chat_router(ChatAppState { hub: hub.clone() });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let served = app.clone();
    tokio::spawn(async move {
        axum::serve(listener, served).await.unwrap();
    });

    let url = format!("ws://{}/websocket", addr);
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    wait_for_connections(&hub, 2).await;

    send_chat(&mut a, "a", "count me").await;
    read_json(&mut b).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/chat/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let stats: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["connections"], 2);
    assert_eq!(stats["messagesRelayed"], 1);
    assert_eq!(stats["deliveriesAttempted"], 1);
    assert_eq!(stats["deliveriesFailed"], 0);
}
