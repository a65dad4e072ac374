use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use glitch_relay::{Hub, RelayState};
use glitch_server::config::Config;
use glitch_server::shutdown_signal;

/// Standalone relay: only `/ws` and `/health`, no REST API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glitch_relay=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let state = RelayState::new(Hub::new(), config.jwt_secret, config.relay_require_auth);
    let app = glitch_relay::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        "Realtime relay listening on {} (auth required: {})",
        addr, config.relay_require_auth
    );
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Relay stopped");
    Ok(())
}
