use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{error, info};

use glitch_db::{CodeCheck, CodeKind};

use crate::error::ApiError;
use crate::mail;
use crate::state::{AppState, with_db};

/// Lifetime of every one-time code.
pub const CODE_TTL: Duration = Duration::from_secs(10 * 60);

/// Uniformly random six-digit code in 100000..=999999.
pub fn generate() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Store a fresh code for `email` (replacing any outstanding one) and mail it.
pub async fn issue(
    state: &AppState,
    kind: CodeKind,
    email: &str,
    user_id: Option<i64>,
) -> Result<(), ApiError> {
    let mailer = state.mailer.clone().ok_or_else(|| {
        error!("Email service is not configured; cannot send {:?} code", kind);
        ApiError::Internal("Email service is not configured. Please contact support.".into())
    })?;

    let code = generate();
    let expires_at = now_ms() + CODE_TTL.as_millis() as i64;
    {
        let email = email.to_string();
        let code = code.clone();
        with_db(state, move |db| db.store_code(kind, &email, user_id, &code, expires_at)).await?;
    }

    let (subject, html) = mail::code_email(kind, &code);
    mailer.send(email, subject, &html).await.map_err(|e| {
        error!("Failed to send {:?} email to {}: {:#}", kind, email, e);
        ApiError::Internal("Failed to send email. Please try again later.".into())
    })?;

    info!("{:?} code sent to {}", kind, email);
    Ok(())
}

/// Check and consume a submitted code, mapping failures to 400 responses
/// with kind-specific wording.
pub async fn redeem(state: &AppState, kind: CodeKind, email: &str, code: &str) -> Result<(), ApiError> {
    let email = email.to_string();
    let code = code.trim().to_string();
    let now = now_ms();
    let check = with_db(state, move |db| db.consume_code(kind, &email, &code, now)).await?;

    let (invalid, expired) = match kind {
        CodeKind::PasswordReset => ("Invalid code", "Code has expired"),
        CodeKind::Mfa => ("Invalid MFA code", "MFA code has expired. Please request a new one."),
        CodeKind::SignupVerification => (
            "Invalid verification code. Please check the code and try again.",
            "Verification code has expired. Please request a new one.",
        ),
    };

    match check {
        CodeCheck::Valid => Ok(()),
        CodeCheck::Expired => Err(ApiError::bad_request(expired)),
        CodeCheck::Invalid => Err(ApiError::bad_request(invalid)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate();
            assert_eq!(code.len(), 6);
            let n: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&n));
        }
    }
}
