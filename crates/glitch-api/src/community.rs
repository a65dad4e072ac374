use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use glitch_db::models::{ChannelRow, MessageRow, NewChannel};
use glitch_types::api::{
    Ack, ChannelResponse, Claims, CommunityUser, CreateChannelRequest, DEFAULT_AVATAR,
    MessageResponse, MessageSender, SendMessageRequest,
};
use glitch_types::models::{AccessLevel, Capability, Role};

use crate::admin::{avatar, display_name, online_window};
use crate::auth::non_empty;
use crate::error::{ApiError, Payload};
use crate::middleware::{Caller, effective_role, load_caller, require_capability};
use crate::state::{AppState, with_db};

/// Channels that can never be deleted, whatever their stored flags say.
pub const PROTECTED_CHANNELS: [&str; 3] = ["welcome", "announcements", "admin"];

pub const MAX_MESSAGE_CHARS: usize = 4000;
const DEFAULT_PAGE: u32 = 100;
const MAX_PAGE: u32 = 500;

// -- Channels --

/// `GET /api/community/channels`: channels the caller may see, flagged
/// `locked` when they may not post.
pub async fn list_channels(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let role = caller_role(&state, &claims).await?;

    let channels = match with_db(&state, |db| db.list_channels()).await {
        Ok(rows) if !rows.is_empty() => rows,
        Ok(_) => default_channels(),
        Err(e) => {
            warn!("Serving default channels: {}", e);
            default_channels()
        }
    };

    let visible: Vec<ChannelResponse> = channels
        .iter()
        .filter_map(|row| channel_response(row, role))
        .collect();

    Ok(Json(visible))
}

/// `POST /api/community/channels`
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Payload(req): Payload<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = require_capability(&state, &claims, Capability::CreateChannels).await?;

    let name = non_empty(req.name).ok_or_else(|| ApiError::bad_request("Channel name is required"))?;
    let slug = slugify(&name);
    if slug.is_empty() {
        return Err(ApiError::bad_request(
            "Channel name must contain letters or numbers",
        ));
    }

    let access_level = match non_empty(req.access_level) {
        Some(raw) => raw
            .parse::<AccessLevel>()
            .map_err(|_| ApiError::bad_request(format!("Invalid access level: {}", raw)))?,
        None => AccessLevel::Open,
    };
    let category = non_empty(req.category)
        .map(|c| c.to_lowercase())
        .unwrap_or_else(|| "general".to_string());
    let description = non_empty(req.description);

    let channel = with_db(&state, move |db| {
        let id = db.insert_channel(
            &slug,
            &NewChannel {
                name: &slug,
                category: &category,
                description: description.as_deref(),
                access_level: access_level.as_str(),
            },
        )?;
        db.get_channel(&id)?
            .ok_or_else(|| anyhow::anyhow!("channel {} vanished after insert", id))
    })
    .await?;

    info!("{} created channel {}", caller.user.username, channel.id);

    let response = channel_response(&channel, caller.role)
        .ok_or_else(|| anyhow::anyhow!("creator cannot view channel {}", channel.id))?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Channel created successfully",
            "channel": response,
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ChannelIdQuery {
    pub id: Option<String>,
}

/// `DELETE /api/community/channels?id=`
pub async fn delete_channel_query(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ChannelIdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = non_empty(query.id).ok_or_else(|| ApiError::bad_request("Channel ID is required"))?;
    delete_channel(&state, &claims, id).await
}

/// `DELETE /api/community/channels/{id}`
pub async fn delete_channel_path(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    delete_channel(&state, &claims, id).await
}

async fn delete_channel(state: &AppState, claims: &Claims, id: String) -> Result<Json<Ack>, ApiError> {
    let caller = require_capability(state, claims, Capability::DeleteChannels).await?;

    if PROTECTED_CHANNELS.contains(&id.as_str()) {
        return Err(ApiError::forbidden("System channels cannot be deleted"));
    }

    let lookup = id.clone();
    let channel = with_db(state, move |db| db.get_channel(&lookup))
        .await?
        .ok_or_else(|| ApiError::not_found("Channel not found"))?;
    if channel.is_system_channel {
        return Err(ApiError::forbidden("System channels cannot be deleted"));
    }

    let target = id.clone();
    if !with_db(state, move |db| db.delete_channel(&target)).await? {
        return Err(ApiError::not_found("Channel not found"));
    }

    info!("{} deleted channel {}", caller.user.username, id);
    Ok(Json(Ack::ok("Channel deleted successfully")))
}

// -- Messages --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    #[serde(alias = "id")]
    pub channel_id: Option<String>,
    pub limit: Option<String>,
    pub before: Option<String>,
}

impl MessagesQuery {
    fn limit(&self) -> u32 {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<u32>().ok())
            .filter(|l| *l > 0)
            .map_or(DEFAULT_PAGE, |l| l.min(MAX_PAGE))
    }

    fn before(&self) -> Option<i64> {
        self.before.as_deref().and_then(|b| b.trim().parse().ok())
    }
}

/// `GET /api/community/channels/messages?channelId=`
pub async fn get_messages_query(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let channel_id = non_empty(query.channel_id.clone())
        .ok_or_else(|| ApiError::bad_request("Channel ID is required"))?;
    get_messages(&state, &claims, channel_id, &query).await
}

/// `GET /api/community/channels/{id}/messages`
pub async fn get_messages_path(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    get_messages(&state, &claims, channel_id, &query).await
}

async fn get_messages(
    state: &AppState,
    claims: &Claims,
    channel_id: String,
    query: &MessagesQuery,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let role = caller_role(state, claims).await?;
    let channel = match find_channel(state, &channel_id).await {
        Ok(channel) => channel,
        Err(ApiError::Internal(_)) => return Ok(Json(Vec::new())),
        Err(e) => return Err(e),
    };
    if !access_level(&channel).can_view(role) {
        return Err(ApiError::forbidden("You do not have access to this channel"));
    }

    let (limit, before) = (query.limit(), query.before());
    let rows = match with_db(state, move |db| db.list_messages(&channel_id, limit, before)).await {
        Ok(rows) => rows,
        Err(_) => {
            warn!("Serving no messages for channel {}", channel.id);
            Vec::new()
        }
    };

    Ok(Json(rows.iter().map(message_response).collect()))
}

/// `POST /api/community/channels/messages?channelId=`
pub async fn post_message_query(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessagesQuery>,
    Payload(req): Payload<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel_id = non_empty(query.channel_id)
        .ok_or_else(|| ApiError::bad_request("Channel ID is required"))?;
    post_message(&state, &claims, channel_id, req).await
}

/// `POST /api/community/channels/{id}/messages`
pub async fn post_message_path(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<String>,
    Payload(req): Payload<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    post_message(&state, &claims, channel_id, req).await
}

async fn post_message(
    state: &AppState,
    claims: &Claims,
    channel_id: String,
    req: SendMessageRequest,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let content = validate_content(req.content)?;

    let caller = load_caller(state, claims).await?;
    let channel = find_channel(state, &channel_id).await?;
    if !access_level(&channel).can_post(caller.role) {
        return Err(ApiError::forbidden(
            "You do not have permission to post in this channel",
        ));
    }

    let user_id = caller.user.id;
    let username = caller.user.username.clone();
    let created_at = glitch_db::now_timestamp();
    let message = {
        let channel_id = channel_id.clone();
        with_db(state, move |db| {
            let id = db.insert_message(&channel_id, user_id, &username, &content, &created_at)?;
            db.get_message(&channel_id, id)?
                .ok_or_else(|| anyhow::anyhow!("message {} vanished after insert", id))
        })
        .await?
    };

    let mut response = message_response(&message);
    response.sender.role = caller.role;

    let destination = format!("/topic/chat/{}", channel_id);
    state.hub.publish_json(&destination, &response).await;

    Ok((StatusCode::CREATED, Json(response)))
}

/// `PUT /api/community/channels/{id}/messages/{message_id}`
pub async fn edit_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((channel_id, message_id)): Path<(String, i64)>,
    Payload(req): Payload<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = validate_content(req.content)?;
    let caller = load_caller(&state, &claims).await?;
    let message = find_message(&state, &channel_id, message_id).await?;
    ensure_author_or(&caller, &message, Capability::EditMessages)?;

    let edited_at = glitch_db::now_timestamp();
    let updated = {
        let channel_id = channel_id.clone();
        with_db(&state, move |db| {
            db.update_message(message_id, &content, &edited_at)?;
            db.get_message(&channel_id, message_id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?
    };

    let response = message_response(&updated);
    state
        .hub
        .publish_json(&format!("/topic/chat/{}", channel_id), &response)
        .await;

    Ok(Json(response))
}

/// `DELETE /api/community/channels/{id}/messages/{message_id}`
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((channel_id, message_id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = load_caller(&state, &claims).await?;
    let message = find_message(&state, &channel_id, message_id).await?;
    ensure_author_or(&caller, &message, Capability::DeleteMessages)?;

    with_db(&state, move |db| db.delete_message(message_id)).await?;

    state
        .hub
        .publish_json(
            &format!("/topic/chat/{}", channel_id),
            &json!({ "type": "delete", "id": message_id, "channelId": channel_id }),
        )
        .await;

    info!("{} deleted message {}", caller.user.username, message_id);
    Ok(Json(Ack::ok("Message deleted successfully")))
}

// -- Users & presence --

/// `GET /api/community/users`, newest first.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let users = with_db(&state, |db| db.list_users()).await?;
    let users: Vec<CommunityUser> = users
        .iter()
        .map(|u| CommunityUser {
            id: u.id,
            username: u.username.clone(),
            name: display_name(u),
            avatar: avatar(u),
            role: effective_role(&state, u),
            created_at: u.created_at.clone(),
            last_seen: u.last_seen.clone(),
        })
        .collect();
    Ok(Json(users))
}

/// `POST /api/community/update-presence`: marks the caller as seen now and
/// pushes the current online set to relay subscribers.
pub async fn update_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub;
    let now = chrono::Utc::now();
    let seen_at = glitch_db::timestamp(now);
    let since = glitch_db::timestamp(now - online_window());

    let online = with_db(&state, move |db| {
        db.touch_last_seen(id, &seen_at)?;
        db.online_users(&since)
    })
    .await?;

    let ids: Vec<i64> = online.iter().map(|u| u.id).collect();
    state
        .hub
        .publish_json(
            "/topic/online-users",
            &json!({ "onlineUserIds": ids, "count": ids.len() }),
        )
        .await;

    Ok(Json(Ack::ok("Presence updated")))
}

// -- Helpers --

/// Lower-case, with every run of non-alphanumerics collapsed to one `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn validate_content(content: Option<String>) -> Result<String, ApiError> {
    let content = non_empty(content).ok_or_else(|| ApiError::bad_request("Message content is required"))?;
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::bad_request(format!(
            "Message is too long (max {} characters)",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(content)
}

/// The caller's current role, or the role in the token when the user
/// table cannot be read.
async fn caller_role(state: &AppState, claims: &Claims) -> Result<Role, ApiError> {
    match load_caller(state, claims).await {
        Ok(caller) => Ok(caller.role),
        Err(ApiError::Internal(_)) => {
            warn!("Using token role for user {}", claims.sub);
            Ok(claims.role)
        }
        Err(e) => Err(e),
    }
}

async fn find_channel(state: &AppState, id: &str) -> Result<ChannelRow, ApiError> {
    let id = id.to_string();
    with_db(state, move |db| db.get_channel(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Channel not found"))
}

async fn find_message(state: &AppState, channel_id: &str, id: i64) -> Result<MessageRow, ApiError> {
    let channel_id = channel_id.to_string();
    with_db(state, move |db| db.get_message(&channel_id, id))
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))
}

fn ensure_author_or(caller: &Caller, message: &MessageRow, capability: Capability) -> Result<(), ApiError> {
    let is_author = message.user_id == Some(caller.user.id);
    if is_author || (caller.role.is_admin() && caller.has(capability)) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only modify your own messages"))
    }
}

fn access_level(channel: &ChannelRow) -> AccessLevel {
    channel.access_level.parse().unwrap_or(AccessLevel::Open)
}

/// `None` when the role may not see the channel at all.
fn channel_response(row: &ChannelRow, role: Role) -> Option<ChannelResponse> {
    let level = access_level(row);
    level.can_view(role).then(|| ChannelResponse {
        id: row.id.clone(),
        name: row.name.clone(),
        category: row.category.clone().unwrap_or_else(|| "general".to_string()),
        description: row.description.clone(),
        access_level: level,
        locked: !level.can_post(role),
        is_system_channel: row.is_system_channel,
    })
}

fn message_response(row: &MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id,
        channel_id: row.channel_id.clone(),
        user_id: row.user_id,
        username: row.username.clone(),
        content: row.content.clone(),
        created_at: row.created_at.clone(),
        timestamp: row.created_at.clone(),
        edited_at: row.edited_at.clone(),
        sender: MessageSender {
            id: row.user_id,
            username: row.username.clone(),
            avatar: row
                .author_avatar
                .clone()
                .unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
            role: row
                .author_role
                .as_deref()
                .map(Role::parse_lenient)
                .unwrap_or(Role::Free),
        },
    }
}

/// Served when the channel table is empty or unreadable.
fn default_channels() -> Vec<ChannelRow> {
    let channel = |id: &str, category: &str, description: &str, access: AccessLevel| ChannelRow {
        id: id.to_string(),
        name: id.to_string(),
        category: Some(category.to_string()),
        description: Some(description.to_string()),
        access_level: access.as_str().to_string(),
        is_system_channel: access != AccessLevel::Open,
        hidden: false,
        created_at: String::new(),
    };

    vec![
        channel("welcome", "announcements", "Welcome to THE GLITCH community!", AccessLevel::ReadOnly),
        channel("announcements", "announcements", "Important announcements", AccessLevel::ReadOnly),
        channel("general", "general", "General discussion", AccessLevel::Open),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Crypto Talk!! 2026 "), "crypto-talk-2026");
        assert_eq!(slugify("day--trading"), "day-trading");
        assert_eq!(slugify("***"), "");
        assert_eq!(slugify("Ünïcode Room"), "ünïcode-room");
    }

    #[test]
    fn content_limits() {
        assert!(validate_content(Some("   ".into())).is_err());
        assert!(validate_content(None).is_err());
        assert_eq!(validate_content(Some(" hi ".into())).unwrap(), "hi");
        assert!(validate_content(Some("x".repeat(MAX_MESSAGE_CHARS))).is_ok());
        assert!(validate_content(Some("x".repeat(MAX_MESSAGE_CHARS + 1))).is_err());
    }

    #[test]
    fn read_only_channels_are_locked_for_members() {
        let row = &default_channels()[0];
        let member = channel_response(row, Role::Free).unwrap();
        assert!(member.locked);
        let admin = channel_response(row, Role::Admin).unwrap();
        assert!(!admin.locked);
    }

    #[test]
    fn page_size_is_clamped() {
        let q = |limit: &str| MessagesQuery {
            limit: Some(limit.into()),
            ..Default::default()
        };
        assert_eq!(q("10").limit(), 10);
        assert_eq!(q("9999").limit(), MAX_PAGE);
        assert_eq!(q("0").limit(), DEFAULT_PAGE);
        assert_eq!(q("abc").limit(), DEFAULT_PAGE);
    }

    #[test]
    fn channel_id_accepts_the_short_alias() {
        let query: MessagesQuery = serde_json::from_str(r#"{"id":"general"}"#).unwrap();
        assert_eq!(query.channel_id.as_deref(), Some("general"));
    }
}
