//! REST handlers for THE GLITCH: auth, admin, community chat, contact and
//! billing, all over one SQLite database.

pub mod admin;
pub mod auth;
pub mod billing;
pub mod codes;
pub mod community;
pub mod contact;
pub mod courses;
pub mod error;
pub mod leaderboard;
pub mod mail;
pub mod mfa;
pub mod middleware;
pub mod password_reset;
pub mod signup_verification;
pub mod state;
pub mod tokens;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use serde_json::json;

pub use error::ApiError;
pub use state::{ApiConfig, AppState, AppStateInner};

/// Every `/api` route plus `/health`, with the session guard applied to
/// the protected group.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/mfa", post(mfa::mfa))
        .route("/api/auth/password-reset", post(password_reset::password_reset))
        .route("/api/auth/forgot-password", post(password_reset::forgot_password))
        .route("/api/auth/verify-reset-code", post(password_reset::verify_reset_code))
        .route("/api/auth/reset-password", post(password_reset::reset_password))
        .route(
            "/api/auth/signup-verification",
            post(signup_verification::signup_verification),
        )
        .route("/api/contact", post(contact::submit))
        .route("/api/leaderboard", get(leaderboard::leaderboard))
        .route("/api/courses", get(courses::list))
        .route("/api/stripe/direct-checkout", get(billing::direct_checkout))
        .route("/api/stripe/webhook", post(billing::webhook))
        .route("/health", get(health));

    let protected_routes = Router::new()
        // Admin
        .route("/api/admin/user-status", get(admin::user_status))
        .route(
            "/api/admin/subscription/check",
            get(admin::subscription_check_query).post(admin::subscription_check_body),
        )
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{id}", delete(admin::delete_user))
        .route("/api/admin/users/{id}/role", put(admin::update_role))
        .route(
            "/api/admin/contact",
            get(contact::list).delete(contact::delete),
        )
        .route("/api/admin/contact/{id}/read", put(contact::mark_read))
        .route("/api/contact", delete(contact::delete))
        // Community
        .route(
            "/api/community/channels",
            get(community::list_channels)
                .post(community::create_channel)
                .delete(community::delete_channel_query),
        )
        .route(
            "/api/community/channels/messages",
            get(community::get_messages_query).post(community::post_message_query),
        )
        .route("/api/community/channels/{id}", delete(community::delete_channel_path))
        .route(
            "/api/community/channels/{id}/messages",
            get(community::get_messages_path).post(community::post_message_path),
        )
        .route(
            "/api/community/channels/{id}/messages/{message_id}",
            put(community::edit_message).delete(community::delete_message),
        )
        .route("/api/community/users", get(community::list_users))
        .route("/api/community/update-presence", post(community::update_presence))
        // Billing
        .route(
            "/api/stripe/subscription-success",
            post(billing::subscription_success),
        )
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "glitch-api" }))
}
