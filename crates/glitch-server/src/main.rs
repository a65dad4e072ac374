use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use glitch_api::mail::{Mailer, SmtpMailer};
use glitch_api::state::with_db;
use glitch_api::{ApiConfig, AppState, AppStateInner, codes};
use glitch_relay::{Hub, RelayState};
use glitch_server::config::Config;
use glitch_server::shutdown_signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glitch_server=debug,glitch_api=debug,glitch_relay=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = glitch_db::Database::open(&config.db_path)?;

    let mailer: Option<Arc<dyn Mailer>> = match &config.email {
        Some(email) => {
            let mailer = SmtpMailer::new(&email.host, email.port, &email.user, &email.pass)?;
            info!("SMTP mailer configured via {}:{}", email.host, email.port);
            Some(Arc::new(mailer))
        }
        None => None,
    };

    // One hub for the REST handlers and the /ws endpoint.
    let hub = Hub::new();
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        mailer,
        hub: hub.clone(),
        config: ApiConfig {
            super_admin_email: config.super_admin_email.clone(),
            frontend_url: config.frontend_url.clone(),
            stripe_webhook_secret: config.stripe_webhook_secret.clone(),
        },
    });

    spawn_code_sweeper(state.clone(), config.code_sweep_interval);

    let relay = RelayState::new(hub, config.jwt_secret.clone(), config.relay_require_auth);
    let app = glitch_api::router(state)
        .merge(glitch_relay::ws_routes(relay))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("THE GLITCH server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Periodically drops expired one-time codes from all three code tables.
fn spawn_code_sweeper(state: AppState, every: std::time::Duration) {
    if every.is_zero() {
        warn!("CODE_SWEEP_SECS is 0; expired codes are only cleared when redeemed");
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let now = codes::now_ms();
            match with_db(&state, move |db| db.purge_expired_codes(now)).await {
                Ok(0) => {}
                Ok(removed) => debug!("Purged {} expired codes", removed),
                Err(e) => error!("Code sweep failed: {}", e),
            }
        }
    });
}
