use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse, response::Response};
use tracing::info;

use glitch_db::CodeKind;
use glitch_db::models::UserRow;
use glitch_types::api::{Ack, MfaRequest};

use crate::auth::{non_empty, session_response};
use crate::codes;
use crate::error::{ApiError, Payload};
use crate::middleware::claims_from_headers;
use crate::state::{AppState, with_db};

/// `POST /api/auth/mfa`. One endpoint, dispatched on `action`:
/// `send`/`resend` mail a code, `verify` trades it for a session, and
/// `enable`/`disable` toggle MFA for the authenticated caller.
pub async fn mfa(
    State(state): State<AppState>,
    headers: HeaderMap,
    Payload(req): Payload<MfaRequest>,
) -> Result<Response, ApiError> {
    let action = req.action.as_deref().map(str::to_ascii_lowercase);
    let code = non_empty(req.code.clone());

    match action.as_deref() {
        Some(toggle @ ("enable" | "disable")) => {
            let claims = claims_from_headers(&state, &headers)?;
            let enabled = toggle == "enable";
            let id = claims.sub;
            with_db(&state, move |db| db.set_mfa_enabled(id, enabled)).await?;
            info!("{} ({}) {}d MFA", claims.username, claims.sub, toggle);
            let message = if enabled { "MFA enabled" } else { "MFA disabled" };
            Ok(Json(Ack::ok(message)).into_response())
        }
        Some("send") => send(&state, &req).await,
        _ if req.resend && code.is_none() => send(&state, &req).await,
        Some("verify") => verify(&state, &req, code).await,
        _ if code.is_some() => verify(&state, &req, code).await,
        _ => Err(ApiError::bad_request(
            "Invalid action. Use action=\"send\" or action=\"verify\"",
        )),
    }
}

async fn send(state: &AppState, req: &MfaRequest) -> Result<Response, ApiError> {
    if req.user_id.is_none() && non_empty(req.email.clone()).is_none() {
        return Err(ApiError::bad_request("User ID or email is required"));
    }
    let user = find_user(state, req).await?;

    codes::issue(state, CodeKind::Mfa, &user.email, Some(user.id)).await?;

    let message = if req.resend {
        "MFA code resent successfully"
    } else {
        "MFA code sent successfully"
    };
    Ok(Json(Ack::ok(message)).into_response())
}

async fn verify(state: &AppState, req: &MfaRequest, code: Option<String>) -> Result<Response, ApiError> {
    let has_identity = req.user_id.is_some() || non_empty(req.email.clone()).is_some();
    let Some(code) = code.filter(|_| has_identity) else {
        return Err(ApiError::bad_request("Code and user ID or email are required"));
    };
    let user = find_user(state, req).await?;

    codes::redeem(state, CodeKind::Mfa, &user.email, &code).await?;

    info!("{} ({}) passed MFA", user.username, user.id);
    Ok(Json(session_response(state, &user, true)?).into_response())
}

/// By id when given, otherwise by email.
async fn find_user(state: &AppState, req: &MfaRequest) -> Result<UserRow, ApiError> {
    let user_id = req.user_id;
    let email = non_empty(req.email.clone()).map(|e| e.to_lowercase());
    with_db(state, move |db| match (user_id, email) {
        (Some(id), _) => db.get_user_by_id(id),
        (None, Some(email)) => db.get_user_by_email(&email),
        (None, None) => Ok(None),
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))
}
