use std::sync::Arc;

use glitch_db::Database;
use glitch_relay::Hub;

use crate::error::ApiError;
use crate::mail::Mailer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// `None` when SMTP credentials are not configured.
    pub mailer: Option<Arc<dyn Mailer>>,
    /// Relay hub shared with the WebSocket endpoint.
    pub hub: Hub,
    pub config: ApiConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub super_admin_email: String,
    pub frontend_url: String,
    pub stripe_webhook_secret: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            super_admin_email: "superadmin@theglitch.world".into(),
            frontend_url: "https://www.theglitch.world".into(),
            stripe_webhook_secret: None,
        }
    }
}

impl AppStateInner {
    pub fn is_super_admin_email(&self, email: &str) -> bool {
        email.eq_ignore_ascii_case(&self.config.super_admin_email)
    }
}

/// Run blocking DB work off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    let result = tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?;
    Ok(result?)
}
