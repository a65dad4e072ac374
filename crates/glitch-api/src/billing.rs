use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{debug, info, warn};

use glitch_types::api::{
    Claims, SubscriptionActivatedResponse, SubscriptionInfo, SubscriptionSuccessRequest,
};
use glitch_types::models::SubscriptionStatus;

use crate::error::{ApiError, Payload};
use crate::state::{AppState, with_db};

type HmacSha256 = Hmac<Sha256>;

/// Seconds a webhook timestamp may drift from our clock.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

const TRIAL_DAYS: i64 = 90;
const RENEWAL_DAYS: i64 = 30;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutQuery {
    pub course_id: Option<String>,
}

/// `GET /api/stripe/direct-checkout`. No hosted checkout yet: every course
/// goes to the subscription page.
pub async fn direct_checkout(
    State(state): State<AppState>,
    Query(query): Query<CheckoutQuery>,
) -> impl IntoResponse {
    debug!("Checkout requested for course {:?}", query.course_id);
    let target = format!(
        "{}/subscription",
        state.config.frontend_url.trim_end_matches('/')
    );
    (StatusCode::FOUND, [(header::LOCATION, target)])
}

/// `POST /api/stripe/subscription-success`
pub async fn subscription_success(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Payload(req): Payload<SubscriptionSuccessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let started = glitch_db::timestamp(now);
    let expiry = glitch_db::timestamp(now + Duration::days(TRIAL_DAYS));

    let id = claims.sub;
    let session_id = req.session_id.filter(|s| !s.trim().is_empty());
    let stored_expiry = expiry.clone();
    let updated = with_db(&state, move |db| {
        db.activate_subscription(id, &started, &stored_expiry, session_id.as_deref())
    })
    .await?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    info!("Activated subscription for {} until {}", claims.username, expiry);
    Ok(Json(SubscriptionActivatedResponse {
        success: true,
        message: "Subscription activated successfully".into(),
        subscription: SubscriptionInfo {
            status: SubscriptionStatus::Active.as_str().to_string(),
            expiry: Some(expiry),
        },
    }))
}

/// `POST /api/stripe/webhook`. Takes the raw body so the signature can be
/// checked against the exact bytes Stripe signed.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(secret) = state.config.stripe_webhook_secret.as_deref() {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::bad_request("Missing Stripe-Signature header"))?;
        verify_signature(secret, signature, &body, Utc::now().timestamp()).map_err(|reason| {
            warn!("Rejected webhook: {}", reason);
            ApiError::bad_request(format!("Webhook Error: {}", reason))
        })?;
    }

    let event: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Webhook Error: {}", e)))?;
    let kind = event["type"].as_str().unwrap_or_default().to_string();
    let email = event["data"]["object"]["customer_email"]
        .as_str()
        .map(|e| e.trim().to_lowercase());

    match (kind.as_str(), email) {
        ("invoice.payment_failed" | "customer.subscription.deleted", Some(email)) => {
            let lookup = email.clone();
            match with_db(&state, move |db| db.mark_payment_failed(&lookup)).await? {
                Some(id) => info!("{}: user {} marked payment failed", kind, id),
                None => warn!("{}: no user with email {}", kind, email),
            }
        }
        ("invoice.payment_succeeded", Some(email)) => {
            let expiry = glitch_db::timestamp(Utc::now() + Duration::days(RENEWAL_DAYS));
            let lookup = email.clone();
            match with_db(&state, move |db| db.mark_payment_succeeded(&lookup, &expiry)).await? {
                Some(id) => info!("{}: user {} renewed", kind, id),
                None => warn!("{}: no user with email {}", kind, email),
            }
        }
        (_, None) if !kind.is_empty() => debug!("{} without customer_email ignored", kind),
        _ => debug!("Unhandled webhook event {:?}", kind),
    }

    Ok(Json(json!({ "received": true })))
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`)
/// against `HMAC-SHA256(secret, "<t>.<payload>")`.
pub fn verify_signature(secret: &str, header: &str, payload: &[u8], now: i64) -> Result<(), String> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", sig)) => candidates.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or("signature header has no timestamp")?;
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err("timestamp outside the tolerance zone".into());
    }

    let matches = candidates.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if matches {
        Ok(())
    } else {
        Err("no signatures found matching the expected signature".into())
    }
}

/// Builds a header the way Stripe does; used by tests and local tooling.
pub fn sign(secret: &str, payload: &[u8], timestamp: i64) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"type":"invoice.payment_failed"}"#;

    #[test]
    fn accepts_fresh_valid_signature() {
        let header = sign(SECRET, BODY, 1_700_000_000).unwrap();
        assert!(verify_signature(SECRET, &header, BODY, 1_700_000_100).is_ok());
    }

    #[test]
    fn rejects_tampered_body_and_wrong_secret() {
        let header = sign(SECRET, BODY, 1_700_000_000).unwrap();
        assert!(verify_signature(SECRET, &header, b"{}", 1_700_000_000).is_err());
        assert!(verify_signature("whsec_other", &header, BODY, 1_700_000_000).is_err());
    }

    #[test]
    fn rejects_stale_timestamp_and_garbage() {
        let header = sign(SECRET, BODY, 1_700_000_000).unwrap();
        assert!(verify_signature(SECRET, &header, BODY, 1_700_000_301).is_err());
        assert!(verify_signature(SECRET, "v1=abcd", BODY, 1_700_000_000).is_err());
        assert!(verify_signature(SECRET, "t=1700000000,v1=zz", BODY, 1_700_000_000).is_err());
    }
}
