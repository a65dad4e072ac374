use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::frame::{Command, Frame};

pub type ConnId = Uuid;

/// Registry of live relay connections and what each one subscribed to.
/// Cheap to clone; the REST handlers hold one to push events to clients.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    connections: RwLock<HashMap<ConnId, Subscriber>>,
}

struct Subscriber {
    tx: mpsc::UnboundedSender<Frame>,
    /// subscription id -> destination
    subscriptions: HashMap<String, String>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Frames for it arrive on the returned receiver.
    pub async fn register(&self) -> (ConnId, mpsc::UnboundedReceiver<Frame>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(
            conn_id,
            Subscriber {
                tx,
                subscriptions: HashMap::new(),
            },
        );
        (conn_id, rx)
    }

    /// Drops the connection and every subscription it held. Dropping the
    /// sender lets the connection's writer drain and stop.
    pub async fn unregister(&self, conn_id: ConnId) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    pub async fn subscribe(&self, conn_id: ConnId, sub_id: &str, destination: &str) -> bool {
        let mut connections = self.inner.connections.write().await;
        match connections.get_mut(&conn_id) {
            Some(sub) => {
                sub.subscriptions
                    .insert(sub_id.to_string(), destination.to_string());
                true
            }
            None => false,
        }
    }

    pub async fn unsubscribe(&self, conn_id: ConnId, sub_id: &str) -> bool {
        let mut connections = self.inner.connections.write().await;
        connections
            .get_mut(&conn_id)
            .and_then(|sub| sub.subscriptions.remove(sub_id))
            .is_some()
    }

    /// Queue a frame for one connection.
    pub async fn send_to(&self, conn_id: ConnId, frame: Frame) -> bool {
        let connections = self.inner.connections.read().await;
        connections
            .get(&conn_id)
            .is_some_and(|sub| sub.tx.send(frame).is_ok())
    }

    /// Deliver `body` as a MESSAGE frame to every subscription on
    /// `destination`. Returns the number of frames queued.
    pub async fn publish(&self, destination: &str, body: &str) -> usize {
        self.deliver(destination, None, body).await
    }

    pub async fn publish_json<T: Serialize>(&self, destination: &str, value: &T) -> usize {
        match serde_json::to_string(value) {
            Ok(body) => self.deliver(destination, Some("application/json"), &body).await,
            Err(e) => {
                warn!("Failed to serialize event for {}: {}", destination, e);
                0
            }
        }
    }

    pub(crate) async fn deliver(
        &self,
        destination: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> usize {
        let connections = self.inner.connections.read().await;
        let mut delivered = 0;

        for sub in connections.values() {
            for (sub_id, dest) in &sub.subscriptions {
                if dest != destination {
                    continue;
                }
                let mut frame = Frame::new(Command::Message)
                    .header("subscription", sub_id.clone())
                    .header("message-id", Uuid::new_v4().to_string())
                    .header("destination", destination);
                if let Some(ct) = content_type {
                    frame = frame.header("content-type", ct);
                }
                if sub.tx.send(frame.body(body)).is_ok() {
                    delivered += 1;
                }
            }
        }

        debug!("Published to {} ({} deliveries)", destination, delivered);
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

/// Client SENDs to `/app/<x>` are fanned out on `/topic/<x>`.
pub fn route_destination(destination: &str) -> String {
    match destination.strip_prefix("/app/") {
        Some(rest) => format!("/topic/{rest}"),
        None => destination.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_prefix_maps_to_topic() {
        assert_eq!(route_destination("/app/chat/general"), "/topic/chat/general");
        assert_eq!(route_destination("/topic/online-users"), "/topic/online-users");
        assert_eq!(route_destination("/queue/x"), "/queue/x");
    }

    #[tokio::test]
    async fn publish_reaches_only_matching_subscriptions() {
        let hub = Hub::new();
        let (a, mut rx_a) = hub.register().await;
        let (b, mut rx_b) = hub.register().await;

        assert!(hub.subscribe(a, "sub-0", "/topic/chat/general").await);
        assert!(hub.subscribe(b, "sub-0", "/topic/chat/forex").await);

        assert_eq!(hub.publish("/topic/chat/general", "hello").await, 1);

        let frame = rx_a.try_recv().unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.get("destination"), Some("/topic/chat/general"));
        assert_eq!(frame.body, "hello");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_and_unregister_stop_delivery() {
        let hub = Hub::new();
        let (a, mut rx) = hub.register().await;
        hub.subscribe(a, "s1", "/topic/x").await;

        assert!(hub.unsubscribe(a, "s1").await);
        assert!(!hub.unsubscribe(a, "s1").await);
        assert_eq!(hub.publish("/topic/x", "{}").await, 0);

        hub.subscribe(a, "s2", "/topic/x").await;
        hub.unregister(a).await;
        assert_eq!(hub.publish("/topic/x", "{}").await, 0);
        assert_eq!(hub.connection_count().await, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_json_sets_content_type() {
        let hub = Hub::new();
        let (a, mut rx) = hub.register().await;
        hub.subscribe(a, "s", "/topic/online-users").await;

        hub.publish_json("/topic/online-users", &serde_json::json!({ "count": 2 })).await;
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.get("content-type"), Some("application/json"));
        assert_eq!(frame.body, r#"{"count":2}"#);
    }
}
