//! Row types mapped directly from SQLite. Kept apart from the glitch-types
//! API models.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub role: String,
    pub mfa_enabled: bool,
    pub subscription_status: String,
    pub subscription_expiry: Option<String>,
    pub payment_failed: bool,
    pub xp: i64,
    pub level: i64,
    pub last_seen: Option<String>,
    pub metadata: String,
    pub created_at: String,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub avatar: &'a str,
    pub role: &'a str,
}

#[derive(Debug, Clone)]
pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub access_level: String,
    pub is_system_channel: bool,
    pub hidden: bool,
    pub created_at: String,
}

pub struct NewChannel<'a> {
    pub name: &'a str,
    pub category: &'a str,
    pub description: Option<&'a str>,
    pub access_level: &'a str,
}

/// A message joined with its author's current avatar and role, when the
/// author still exists.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub channel_id: String,
    pub user_id: Option<i64>,
    pub username: String,
    pub content: String,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub author_avatar: Option<String>,
    pub author_role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContactRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct CourseRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub level: String,
    pub duration: i64,
    pub price: f64,
    pub image_url: String,
}
