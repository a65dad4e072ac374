//! Drives the relay over a real socket with a STOMP client written by hand.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use glitch_relay::frame::{Command, Frame, parse_frames};
use glitch_relay::{Hub, RelayState};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn start(require_auth: bool) -> (String, Hub) {
    let hub = Hub::new();
    let app = glitch_relay::router(RelayState::new(hub.clone(), "test-secret", require_auth));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{}/ws", addr), hub)
}

async fn send(client: &mut Client, frame: Frame) {
    client.send(Message::text(frame.encode())).await.unwrap();
}

/// Next STOMP frame, skipping pings and heart-beats.
async fn next_frame(client: &mut Client) -> Frame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            let mut frames = parse_frames(text.as_str()).unwrap();
            if !frames.is_empty() {
                return frames.remove(0);
            }
        }
    }
}

async fn connect(url: &str) -> Client {
    let (mut client, _) = connect_async(url).await.unwrap();
    send(
        &mut client,
        Frame::new(Command::Connect).header("accept-version", "1.2"),
    )
    .await;
    let connected = next_frame(&mut client).await;
    assert_eq!(connected.command, Command::Connected);
    assert_eq!(connected.get("version"), Some("1.2"));
    client
}

async fn subscribe(client: &mut Client, id: &str, destination: &str) {
    send(
        client,
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("receipt", format!("r-{id}")),
    )
    .await;
    let receipt = next_frame(client).await;
    assert_eq!(receipt.command, Command::Receipt);
    assert_eq!(receipt.get("receipt-id"), Some(format!("r-{id}").as_str()));
}

#[tokio::test]
async fn app_send_is_rebroadcast_on_topic() {
    let (url, _hub) = start(false).await;
    let mut alice = connect(&url).await;
    let mut bob = connect(&url).await;

    subscribe(&mut bob, "sub-0", "/topic/chat/general").await;

    send(
        &mut alice,
        Frame::new(Command::Send)
            .header("destination", "/app/chat/general")
            .header("content-type", "application/json")
            .body(r#"{"content":"gm"}"#),
    )
    .await;

    let msg = next_frame(&mut bob).await;
    assert_eq!(msg.command, Command::Message);
    assert_eq!(msg.get("destination"), Some("/topic/chat/general"));
    assert_eq!(msg.get("subscription"), Some("sub-0"));
    assert_eq!(msg.get("content-type"), Some("application/json"));
    assert_eq!(msg.body, r#"{"content":"gm"}"#);
}

#[tokio::test]
async fn server_side_publish_reaches_subscribers() {
    let (url, hub) = start(false).await;
    let mut client = connect(&url).await;
    subscribe(&mut client, "presence", "/topic/online-users").await;

    let delivered = hub
        .publish_json("/topic/online-users", &serde_json::json!({ "online": [1, 2] }))
        .await;
    assert_eq!(delivered, 1);

    let msg = next_frame(&mut client).await;
    assert_eq!(msg.body, r#"{"online":[1,2]}"#);
}

#[tokio::test]
async fn first_frame_must_be_connect() {
    let (url, _hub) = start(false).await;
    let (mut client, _) = connect_async(&url).await.unwrap();

    send(
        &mut client,
        Frame::new(Command::Send).header("destination", "/app/x"),
    )
    .await;
    let error = next_frame(&mut client).await;
    assert_eq!(error.command, Command::Error);
    assert!(error.get("message").unwrap().contains("expected CONNECT"));
}

#[tokio::test]
async fn connect_without_token_is_refused_when_auth_required() {
    let (url, hub) = start(true).await;
    let (mut client, _) = connect_async(&url).await.unwrap();

    send(&mut client, Frame::new(Command::Connect)).await;
    let error = next_frame(&mut client).await;
    assert_eq!(error.command, Command::Error);
    assert_eq!(error.get("message"), Some("Authentication failed"));
    assert_eq!(hub.connection_count().await, 0);
}

#[tokio::test]
async fn disconnect_sends_receipt_and_releases_subscriptions() {
    let (url, hub) = start(false).await;
    let mut client = connect(&url).await;
    subscribe(&mut client, "s", "/topic/x").await;

    send(
        &mut client,
        Frame::new(Command::Disconnect).header("receipt", "bye"),
    )
    .await;
    let receipt = next_frame(&mut client).await;
    assert_eq!(receipt.command, Command::Receipt);
    assert_eq!(receipt.get("receipt-id"), Some("bye"));

    // The session is torn down asynchronously after the receipt.
    for _ in 0..50 {
        if hub.connection_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(hub.publish("/topic/x", "late").await, 0);
}

#[tokio::test]
async fn health_reports_service_name() {
    let (url, _hub) = start(false).await;
    let health_url = url.replace("ws://", "http://").replace("/ws", "/health");
    let addr = health_url.trim_start_matches("http://").trim_end_matches("/health");

    // Plain HTTP/1.1 request over a raw socket; no HTTP client needed.
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#""service":"glitch-realtime""#));
}
