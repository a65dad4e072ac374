use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, info, warn};

use glitch_types::api::Claims;

use crate::RelayAuth;
use crate::frame::{Command, Frame, parse_frames};
use crate::hub::{ConnId, Hub, route_destination};

/// Server sends a Ping every 15 seconds. Two consecutive missed Pongs
/// (~30s) drop the connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// A client has this long to send CONNECT after the upgrade.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the writer may keep flushing queued frames after the reader ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

/// Run one STOMP session over an upgraded WebSocket.
pub async fn handle_connection(socket: WebSocket, hub: Hub, auth: Arc<RelayAuth>) {
    let (mut sender, mut receiver) = socket.split();

    let (connect, leftover) = match wait_for_connect(&mut receiver).await {
        Ok(found) => found,
        Err(reason) => {
            warn!("Relay client rejected before CONNECT: {}", reason);
            send_and_close(&mut sender, Frame::error(reason)).await;
            return;
        }
    };

    let identity = match authenticate(&connect, &auth) {
        Ok(identity) => identity,
        Err(reason) => {
            warn!("Relay CONNECT rejected: {}", reason);
            send_and_close(&mut sender, Frame::error(reason)).await;
            return;
        }
    };
    let label = identity
        .as_ref()
        .map(|c| format!("{} ({})", c.username, c.sub))
        .unwrap_or_else(|| "anonymous".to_string());

    let (conn_id, mut frame_rx) = hub.register().await;

    let mut connected = Frame::new(Command::Connected)
        .header("version", "1.2")
        .header("heart-beat", "0,0")
        .header("server", concat!("glitch-realtime/", env!("CARGO_PKG_VERSION")))
        .header("session", conn_id.to_string());
    if let Some(user) = &identity {
        connected = connected.header("user-name", user.username.clone());
    }
    if sender.send(text(&connected)).await.is_err() {
        hub.unregister(conn_id).await;
        return;
    }
    if let Some(receipt) = connect.get("receipt") {
        hub.send_to(conn_id, receipt_frame(receipt)).await;
    }

    info!("{} connected to relay as {}", label, conn_id);

    // Frames that arrived in the same message as CONNECT.
    let mut open = true;
    for frame in leftover {
        if !handle_frame(&hub, conn_id, frame).await {
            open = false;
            break;
        }
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if sender.send(text(&frame)).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = sender.close().await;
    });

    let hub_recv = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        if !open {
            return;
        }
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(body) => {
                    let frames = match parse_frames(body.as_str()) {
                        Ok(frames) => frames,
                        Err(e) => {
                            debug!("Malformed frame from {}: {}", conn_id, e);
                            hub_recv.send_to(conn_id, Frame::error(e.to_string())).await;
                            return;
                        }
                    };
                    for frame in frames {
                        if !handle_frame(&hub_recv, conn_id, frame).await {
                            return;
                        }
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => return,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => {
            // Let the writer flush a trailing RECEIPT or ERROR.
            hub.unregister(conn_id).await;
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
    }

    hub.unregister(conn_id).await;
    info!("{} disconnected from relay ({})", label, conn_id);
}

/// Handle one client frame. Returns false when the session must end.
async fn handle_frame(hub: &Hub, conn_id: ConnId, frame: Frame) -> bool {
    let keep_open = match frame.command {
        Command::Send => match frame.get("destination") {
            Some(destination) => {
                let target = route_destination(destination);
                let delivered = hub
                    .deliver(&target, frame.get("content-type"), &frame.body)
                    .await;
                debug!("{} SEND {} -> {} ({} deliveries)", conn_id, destination, target, delivered);
                true
            }
            None => {
                hub.send_to(conn_id, Frame::error("SEND requires a destination header"))
                    .await;
                return false;
            }
        },
        Command::Subscribe => match (frame.get("id"), frame.get("destination")) {
            (Some(id), Some(destination)) => {
                hub.subscribe(conn_id, id, destination).await;
                debug!("{} subscribed {} to {}", conn_id, id, destination);
                true
            }
            _ => {
                hub.send_to(
                    conn_id,
                    Frame::error("SUBSCRIBE requires id and destination headers"),
                )
                .await;
                return false;
            }
        },
        Command::Unsubscribe => match frame.get("id") {
            Some(id) => {
                hub.unsubscribe(conn_id, id).await;
                true
            }
            None => {
                hub.send_to(conn_id, Frame::error("UNSUBSCRIBE requires an id header"))
                    .await;
                return false;
            }
        },
        // No transactions or acknowledgements to track; accept and move on.
        Command::Ack | Command::Nack | Command::Begin | Command::Commit | Command::Abort => true,
        Command::Connect | Command::Stomp => true,
        Command::Disconnect => false,
        server_only => {
            hub.send_to(
                conn_id,
                Frame::error(format!("{} is a server frame", server_only)),
            )
            .await;
            return false;
        }
    };

    if let Some(receipt) = frame.get("receipt") {
        hub.send_to(conn_id, receipt_frame(receipt)).await;
    }
    keep_open
}

/// Reads until a CONNECT (or STOMP) frame shows up. Any other first frame is
/// a protocol error. Returns the CONNECT frame plus whatever followed it in
/// the same message.
async fn wait_for_connect(receiver: &mut WsReceiver) -> Result<(Frame, Vec<Frame>), String> {
    let wait = tokio::time::timeout(CONNECT_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            let body = match msg {
                Message::Text(body) => body,
                Message::Close(_) => break,
                _ => continue,
            };
            let mut frames = match parse_frames(body.as_str()) {
                Ok(frames) => frames.into_iter(),
                Err(e) => return Err(e.to_string()),
            };
            match frames.next() {
                None => continue,
                Some(f) if matches!(f.command, Command::Connect | Command::Stomp) => {
                    return Ok((f, frames.collect::<Vec<_>>()));
                }
                Some(f) => return Err(format!("expected CONNECT, got {}", f.command)),
            }
        }
        Err("connection closed before CONNECT".to_string())
    });

    wait.await
        .unwrap_or_else(|_| Err("timed out waiting for CONNECT".to_string()))
}

/// With auth required the CONNECT must carry a valid session token, either
/// as `Authorization: Bearer <jwt>` or as `passcode`. Without it a token is
/// still decoded when present, for logging.
fn authenticate(connect: &Frame, auth: &RelayAuth) -> Result<Option<Claims>, String> {
    let token = connect
        .get("Authorization")
        .or_else(|| connect.get("authorization"))
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
        .or_else(|| connect.get("passcode"))
        .filter(|t| !t.is_empty());

    let claims = token.and_then(|token| {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .ok()
        .map(|data| data.claims)
    });

    if auth.require_auth && claims.is_none() {
        return Err("Authentication failed".to_string());
    }
    Ok(claims)
}

fn receipt_frame(receipt: &str) -> Frame {
    Frame::new(Command::Receipt).header("receipt-id", receipt)
}

fn text(frame: &Frame) -> Message {
    Message::Text(frame.encode().into())
}

async fn send_and_close(sender: &mut WsSender, frame: Frame) {
    let _ = sender.send(text(&frame)).await;
    let _ = sender.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use glitch_types::models::Role;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str) -> String {
        let claims = Claims {
            sub: 7,
            email: "a@b.co".into(),
            username: "alice".into(),
            role: Role::Free,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn auth(required: bool) -> RelayAuth {
        RelayAuth {
            jwt_secret: "relay-secret".into(),
            require_auth: required,
        }
    }

    #[test]
    fn anonymous_connect_allowed_when_auth_optional() {
        let connect = Frame::new(Command::Connect);
        assert!(authenticate(&connect, &auth(false)).unwrap().is_none());
        assert!(authenticate(&connect, &auth(true)).is_err());
    }

    #[test]
    fn bearer_and_passcode_tokens_are_accepted() {
        let bearer = Frame::new(Command::Connect)
            .header("Authorization", format!("Bearer {}", token("relay-secret")));
        let claims = authenticate(&bearer, &auth(true)).unwrap().unwrap();
        assert_eq!(claims.username, "alice");

        let passcode = Frame::new(Command::Connect).header("passcode", token("relay-secret"));
        assert!(authenticate(&passcode, &auth(true)).unwrap().is_some());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let connect = Frame::new(Command::Connect)
            .header("Authorization", format!("Bearer {}", token("other")));
        assert!(authenticate(&connect, &auth(true)).is_err());
        assert!(authenticate(&connect, &auth(false)).unwrap().is_none());
    }
}
