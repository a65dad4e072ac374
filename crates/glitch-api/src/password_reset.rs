use axum::{Json, extract::State, response::IntoResponse, response::Response};
use tracing::{info, warn};

use glitch_db::CodeKind;
use glitch_types::api::{Ack, PasswordResetRequest, ResetTokenResponse};

use crate::auth::{MIN_PASSWORD_LEN, hash_password, non_empty};
use crate::codes;
use crate::error::{ApiError, Payload};
use crate::state::{AppState, with_db};
use crate::tokens;

/// `POST /api/auth/password-reset`, dispatched on `action`
/// (`forgot`, `verify`, `reset`) or inferred from the fields present.
pub async fn password_reset(
    State(state): State<AppState>,
    Payload(req): Payload<PasswordResetRequest>,
) -> Result<Response, ApiError> {
    let has_code = non_empty(req.code.clone()).is_some();
    let has_token = non_empty(req.token.clone()).is_some();
    let has_password = req.new_password.as_deref().is_some_and(|p| !p.is_empty());

    match req.action.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("forgot") => forgot(&state, req).await,
        Some("verify") => verify(&state, req).await,
        Some("reset") => reset(&state, req).await,
        None if has_code && !has_token => verify(&state, req).await,
        None if has_token && has_password => reset(&state, req).await,
        None if !has_code && !has_token => forgot(&state, req).await,
        _ => Err(ApiError::bad_request(
            "Invalid action. Use action=\"forgot\", action=\"verify\" or action=\"reset\"",
        )),
    }
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Payload(req): Payload<PasswordResetRequest>,
) -> Result<Response, ApiError> {
    forgot(&state, req).await
}

pub async fn verify_reset_code(
    State(state): State<AppState>,
    Payload(req): Payload<PasswordResetRequest>,
) -> Result<Response, ApiError> {
    verify(&state, req).await
}

pub async fn reset_password(
    State(state): State<AppState>,
    Payload(req): Payload<PasswordResetRequest>,
) -> Result<Response, ApiError> {
    reset(&state, req).await
}

/// Mails a reset code when the account exists. The answer is the same
/// either way so the endpoint cannot be used to discover accounts.
async fn forgot(state: &AppState, req: PasswordResetRequest) -> Result<Response, ApiError> {
    let Some(email) = non_empty(req.email).map(|e| e.to_lowercase()) else {
        return Err(ApiError::bad_request("Email is required"));
    };

    let lookup = email.clone();
    match with_db(state, move |db| db.get_user_by_email(&lookup)).await? {
        Some(user) => codes::issue(state, CodeKind::PasswordReset, &email, Some(user.id)).await?,
        None => warn!("Password reset requested for unknown email"),
    }

    Ok(Json(Ack::ok("If an account exists for this email, a reset code has been sent")).into_response())
}

async fn verify(state: &AppState, req: PasswordResetRequest) -> Result<Response, ApiError> {
    let (Some(email), Some(code)) = (non_empty(req.email), non_empty(req.code)) else {
        return Err(ApiError::bad_request("Email and code are required"));
    };
    let email = email.to_lowercase();

    codes::redeem(state, CodeKind::PasswordReset, &email, &code).await?;
    let token = tokens::create_reset_token(&state.jwt_secret, &email)?;

    Ok(Json(ResetTokenResponse {
        success: true,
        token,
        message: "Code verified successfully".into(),
    })
    .into_response())
}

async fn reset(state: &AppState, req: PasswordResetRequest) -> Result<Response, ApiError> {
    let (Some(token), Some(new_password)) = (
        non_empty(req.token),
        req.new_password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Token and new password are required"));
    };
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }

    let email = tokens::verify_reset_token(&state.jwt_secret, &token).map_err(|e| {
        if tokens::is_expired(&e) {
            ApiError::bad_request("Token has expired")
        } else {
            ApiError::bad_request("Invalid token")
        }
    })?;

    let password_hash = hash_password(&new_password)?;
    let target = email.clone();
    let updated = with_db(state, move |db| db.set_password_by_email(&target, &password_hash)).await?;
    if updated == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    info!("Password reset completed for {}", email);
    Ok(Json(Ack::ok("Password reset successfully")).into_response())
}
