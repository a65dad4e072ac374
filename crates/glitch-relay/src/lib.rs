//! STOMP-over-WebSocket relay. Clients SUBSCRIBE to destinations and every
//! SEND is fanned out to the matching subscriptions. Nothing is persisted.

pub mod connection;
pub mod frame;
pub mod hub;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

pub use hub::Hub;

pub struct RelayAuth {
    pub jwt_secret: String,
    /// When set, CONNECT must carry a valid session token.
    pub require_auth: bool,
}

#[derive(Clone)]
pub struct RelayState {
    pub hub: Hub,
    pub auth: Arc<RelayAuth>,
}

impl RelayState {
    pub fn new(hub: Hub, jwt_secret: impl Into<String>, require_auth: bool) -> Self {
        Self {
            hub,
            auth: Arc::new(RelayAuth {
                jwt_secret: jwt_secret.into(),
                require_auth,
            }),
        }
    }
}

/// `/ws` (STOMP endpoint) and `/health`.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
        .merge(ws_routes(state))
}

/// Just the `/ws` endpoint, for mounting next to another service's routes.
pub fn ws_routes(state: RelayState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(State(state): State<RelayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.protocols(["v12.stomp", "v11.stomp", "v10.stomp"])
        .on_upgrade(move |socket| connection::handle_connection(socket, state.hub, state.auth))
}

async fn health(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "glitch-realtime",
        "websocket": "active",
        "connections": state.hub.connection_count().await,
    }))
}
