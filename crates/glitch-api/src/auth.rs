use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use glitch_db::CodeKind;
use glitch_db::models::{NewUser, UserRow};
use glitch_types::api::{
    AuthResponse, DEFAULT_AVATAR, LoginRequest, RegisterRequest, SubscriptionInfo, UserProfile,
};
use glitch_types::models::{Role, SubscriptionStatus};

use crate::codes;
use crate::error::{ApiError, Payload};
use crate::middleware::effective_role;
use crate::state::{AppState, AppStateInner, with_db};
use crate::tokens;

pub const MIN_PASSWORD_LEN: usize = 6;

pub async fn register(
    State(state): State<AppState>,
    Payload(req): Payload<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(username), Some(email), Some(password)) = (
        non_empty(req.username),
        non_empty(req.email),
        req.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Username, email, and password are required"));
    };

    let email = email.to_lowercase();
    let username = username.to_lowercase();
    if !looks_like_email(&email) {
        return Err(ApiError::bad_request("Please enter a valid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }

    let (email_taken, username_taken) = {
        let email = email.clone();
        let username = username.clone();
        with_db(&state, move |db| {
            Ok((
                db.get_user_by_email(&email)?.is_some(),
                db.get_user_by_username(&username)?.is_some(),
            ))
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
            "Username already taken. Please choose a different username.".into(),
        ));
    }

    let password_hash = hash_password(&password)?;
    let role = if state.is_super_admin_email(&email) {
        Role::SuperAdmin
    } else {
        Role::Free
    };
    let name = non_empty(req.name).unwrap_or_else(|| username.clone());
    let avatar = non_empty(req.avatar).unwrap_or_else(|| DEFAULT_AVATAR.to_string());

    let user = with_db(&state, move |db| {
        let id = db.create_user(&NewUser {
            username: &username,
            email: &email,
            password_hash: &password_hash,
            name: &name,
            avatar: &avatar,
            role: role.as_str(),
        })?;
        db.get_user_by_id(id)?
            .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))
    })
    .await?;

    info!("Registered {} ({})", user.username, user.id);

    Ok(Json(session_response(&state, &user, false)?))
}

pub async fn login(
    State(state): State<AppState>,
    Payload(req): Payload<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(email), Some(password)) = (non_empty(req.email), req.password.filter(|p| !p.is_empty()))
    else {
        return Err(ApiError::bad_request("Email and password are required"));
    };
    let email = email.to_lowercase();

    let lookup = email.clone();
    let mut user = with_db(&state, move |db| db.get_user_by_email(&lookup))
        .await?
        .ok_or_else(|| {
            ApiError::Unauthorized("The account connected to this email is not in use".into())
        })?;

    if !verify_password(&password, &user.password) {
        warn!("Failed login for {}", user.id);
        return Err(ApiError::Unauthorized(
            "Incorrect password for this account".into(),
        ));
    }

    let id = user.id;
    let now = glitch_db::now_timestamp();
    let lapsed = subscription_lapsed(&user);
    with_db(&state, move |db| {
        db.touch_last_seen(id, &now)?;
        if lapsed {
            db.set_subscription_status(id, SubscriptionStatus::Expired.as_str())?;
        }
        Ok(())
    })
    .await?;
    if lapsed {
        user.subscription_status = SubscriptionStatus::Expired.as_str().to_string();
    }

    if user.mfa_enabled {
        codes::issue(&state, CodeKind::Mfa, &user.email, Some(user.id)).await?;
        info!("{} ({}) logged in, awaiting MFA", user.username, user.id);
        return Ok(Json(AuthResponse {
            success: true,
            status: "MFA_REQUIRED".into(),
            user: profile(&state, &user),
            token: None,
            subscription: None,
            mfa_required: true,
            mfa_verified: false,
        }));
    }

    info!("{} ({}) logged in", user.username, user.id);
    Ok(Json(session_response(&state, &user, false)?))
}

/// Profile plus a fresh session token.
pub(crate) fn session_response(
    state: &AppStateInner,
    user: &UserRow,
    mfa_verified: bool,
) -> Result<AuthResponse, ApiError> {
    let role = effective_role(state, user);
    let token = tokens::create_session_token(&state.jwt_secret, user, role)?;

    Ok(AuthResponse {
        success: true,
        status: "SUCCESS".into(),
        user: profile(state, user),
        token: Some(token),
        subscription: Some(SubscriptionInfo {
            status: SubscriptionStatus::parse_lenient(Some(&user.subscription_status))
                .as_str()
                .to_string(),
            expiry: user.subscription_expiry.clone(),
        }),
        mfa_required: false,
        mfa_verified,
    })
}

pub(crate) fn profile(state: &AppStateInner, user: &UserRow) -> UserProfile {
    UserProfile {
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        name: user.name.clone().unwrap_or_else(|| user.username.clone()),
        avatar: user
            .avatar
            .clone()
            .unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
        role: effective_role(state, user),
    }
}

/// An `active` subscription whose expiry has passed.
pub(crate) fn subscription_lapsed(user: &UserRow) -> bool {
    user.subscription_status == SubscriptionStatus::Active.as_str()
        && user
            .subscription_expiry
            .as_deref()
            .and_then(|e| DateTime::parse_from_rfc3339(e).ok())
            .is_some_and(|expiry| expiry < Utc::now())
}

pub(crate) fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Checks `password` against an argon2 PHC string or a legacy bcrypt
/// hash (`$2a$`, `$2b$`, `$2y$`). An unreadable hash never matches.
pub(crate) fn verify_password(password: &str, stored: &str) -> bool {
    if is_bcrypt_hash(stored) {
        return match bcrypt::verify(password, stored) {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Stored bcrypt hash is unreadable: {}", e);
                false
            }
        };
    }

    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

fn is_bcrypt_hash(stored: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"].iter().any(|prefix| stored.starts_with(prefix))
}

pub(crate) fn looks_like_email(email: &str) -> bool {
    email.contains('@') && email.contains('.')
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
