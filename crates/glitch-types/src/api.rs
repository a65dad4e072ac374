use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{AccessLevel, Role};

/// Avatar used when a user never picked one.
pub const DEFAULT_AVATAR: &str = "/avatars/avatar_ai.png";

// -- JWT Claims --

/// Session token claims, shared by the REST middleware and the realtime
/// relay's CONNECT authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

/// Claims of the short-lived token handed out after a reset code is verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub sub: String,
    pub purpose: String,
    pub exp: usize,
}

/// Generic `{success, message}` body.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }
}

/// Clients send ids both as JSON numbers and as strings.
fn flexible_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(id)) => Ok(Some(id)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

// -- Auth --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub avatar: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub status: String,
    pub expiry: Option<String>,
}

/// Body returned by register, login and MFA verification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub status: String,
    #[serde(flatten)]
    pub user: UserProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionInfo>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub mfa_required: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub mfa_verified: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MfaRequest {
    pub action: Option<String>,
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub code: Option<String>,
    pub resend: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PasswordResetRequest {
    pub action: Option<String>,
    pub email: Option<String>,
    pub code: Option<String>,
    pub token: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetTokenResponse {
    pub success: bool,
    pub token: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupVerificationRequest {
    pub action: Option<String>,
    pub email: Option<String>,
    pub code: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub success: bool,
    pub verified: bool,
    pub message: String,
}

// -- Admin --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub avatar: String,
    pub role: Role,
    pub capabilities: Vec<String>,
    pub mfa_enabled: bool,
    pub subscription_status: String,
    pub payment_failed: bool,
    pub created_at: String,
    pub last_seen: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub avatar: String,
    pub role: Role,
    pub last_seen: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusResponse {
    pub success: bool,
    pub online_users: Vec<OnlineUser>,
    pub total_users: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubscriptionCheckRequest {
    #[serde(deserialize_with = "flexible_id")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCheckResponse {
    pub success: bool,
    pub has_active_subscription: bool,
    pub is_admin: bool,
    pub payment_failed: bool,
    pub expiry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// -- Contact --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessageResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub created_at: String,
    pub read: bool,
}

// -- Community --

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateChannelRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub access_level: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub access_level: AccessLevel,
    pub locked: bool,
    pub is_system_channel: bool,
}

/// Message bodies only carry content; the author comes from the session token.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SendMessageRequest {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageSender {
    pub id: Option<i64>,
    pub username: String,
    pub avatar: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: i64,
    pub channel_id: String,
    pub user_id: Option<i64>,
    pub username: String,
    pub content: String,
    pub created_at: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
    pub sender: MessageSender,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityUser {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub avatar: String,
    pub role: Role,
    pub created_at: String,
    pub last_seen: Option<String>,
}

// -- Leaderboard & courses --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: i64,
    pub username: String,
    pub xp: i64,
    pub level: i64,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub success: bool,
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub level: String,
    pub duration: i64,
    pub price: f64,
    pub image_url: String,
}

// -- Billing --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubscriptionSuccessRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionActivatedResponse {
    pub success: bool,
    pub message: String,
    pub subscription: SubscriptionInfo,
}
