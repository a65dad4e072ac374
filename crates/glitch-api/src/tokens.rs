use anyhow::{Result, bail};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use glitch_db::models::UserRow;
use glitch_types::api::{Claims, ResetClaims};
use glitch_types::models::Role;

pub const RESET_PURPOSE: &str = "password_reset";

fn session_ttl() -> Duration {
    Duration::hours(24)
}

fn reset_ttl() -> Duration {
    Duration::minutes(15)
}

pub fn create_session_token(secret: &str, user: &UserRow, role: Role) -> Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        username: user.username.clone(),
        role,
        exp: (Utc::now() + session_ttl()).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_session_token(secret: &str, token: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Short-lived token proving a reset code was verified for `email`.
pub fn create_reset_token(secret: &str, email: &str) -> Result<String> {
    let claims = ResetClaims {
        sub: email.to_string(),
        purpose: RESET_PURPOSE.to_string(),
        exp: (Utc::now() + reset_ttl()).timestamp() as usize,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Returns the email the reset token was issued for.
pub fn verify_reset_token(secret: &str, token: &str) -> Result<String> {
    let data = decode::<ResetClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    if data.claims.purpose != RESET_PURPOSE {
        bail!("token was not issued for a password reset");
    }
    Ok(data.claims.sub)
}

/// True when the error came from an `exp` claim in the past.
pub fn is_expired(err: &anyhow::Error) -> bool {
    err.downcast_ref::<jsonwebtoken::errors::Error>()
        .is_some_and(|e| matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature))
}
