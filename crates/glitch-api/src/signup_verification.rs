use axum::{Json, extract::State, response::IntoResponse, response::Response};

use glitch_db::CodeKind;
use glitch_types::api::{Ack, SignupVerificationRequest, VerifiedResponse};

use crate::auth::{looks_like_email, non_empty};
use crate::codes;
use crate::error::{ApiError, Payload};
use crate::state::{AppState, with_db};

/// `POST /api/auth/signup-verification`: `send` (the default) mails a code
/// to an unregistered address, `verify` checks it.
pub async fn signup_verification(
    State(state): State<AppState>,
    Payload(req): Payload<SignupVerificationRequest>,
) -> Result<Response, ApiError> {
    match req.action.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("send") => send(&state, req).await,
        Some("verify") => verify(&state, req).await,
        Some(_) => Err(ApiError::bad_request("Invalid action. Use \"send\" or \"verify\".")),
    }
}

async fn send(state: &AppState, req: SignupVerificationRequest) -> Result<Response, ApiError> {
    let Some(email) = non_empty(req.email)
        .map(|e| e.to_lowercase())
        .filter(|e| looks_like_email(e))
    else {
        return Err(ApiError::bad_request("Valid email address is required"));
    };
    let username = non_empty(req.username).map(|u| u.to_lowercase());

    let (email_taken, username_taken) = {
        let email = email.clone();
        with_db(state, move |db| {
            let username_taken = match username {
                Some(name) => db.get_user_by_username(&name)?.is_some(),
                None => false,
            };
            Ok((db.get_user_by_email(&email)?.is_some(), username_taken))
        })
        .await?
    };
    if email_taken {
        return Err(ApiError::Conflict(
            "An account with this email already exists. Please sign in instead.".into(),
        ));
    }
    if username_taken {
        return Err(ApiError::Conflict(
            "This username is already taken. Please choose a different username.".into(),
        ));
    }

    codes::issue(state, CodeKind::SignupVerification, &email, None).await?;
    Ok(Json(Ack::ok("Verification code sent successfully")).into_response())
}

async fn verify(state: &AppState, req: SignupVerificationRequest) -> Result<Response, ApiError> {
    let (Some(email), Some(code)) = (non_empty(req.email), non_empty(req.code)) else {
        return Err(ApiError::bad_request("Email and verification code are required"));
    };

    codes::redeem(state, CodeKind::SignupVerification, &email.to_lowercase(), &code).await?;

    Ok(Json(VerifiedResponse {
        success: true,
        verified: true,
        message: "Email verified successfully".into(),
    })
    .into_response())
}
