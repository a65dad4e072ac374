use axum::{Json, extract::{Query, State}, response::IntoResponse};
use serde::Deserialize;
use tracing::{debug, error};

use glitch_db::models::UserRow;
use glitch_types::api::{LeaderboardEntry, LeaderboardResponse};

use crate::state::{AppState, with_db};

const LEADERBOARD_SIZE: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    /// Accepted for client compatibility; rankings are all-time.
    pub timeframe: Option<String>,
}

/// `GET /api/leaderboard`. Never fails: storage errors yield an empty board.
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    debug!("Leaderboard requested (timeframe {:?})", query.timeframe);

    let leaderboard = match with_db(&state, |db| db.leaderboard(LEADERBOARD_SIZE)).await {
        Ok(users) => users
            .into_iter()
            .enumerate()
            .map(|(index, user)| LeaderboardEntry {
                rank: index + 1,
                user_id: user.id,
                username: board_name(&user),
                xp: user.xp,
                level: user.level,
            })
            .collect(),
        Err(e) => {
            error!("Leaderboard query failed: {}", e);
            Vec::new()
        }
    };

    Json(LeaderboardResponse {
        success: true,
        leaderboard,
    })
}

/// Username, else display name, else the local part of the email. The
/// board is public, so the email itself is never listed.
fn board_name(user: &UserRow) -> String {
    [Some(user.username.as_str()), user.name.as_deref(), user.email.split('@').next()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty())
        .unwrap_or("User")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str, name: Option<&str>, email: &str) -> UserRow {
        UserRow {
            id: 1,
            username: username.into(),
            email: email.into(),
            password: String::new(),
            name: name.map(Into::into),
            avatar: None,
            role: "free".into(),
            mfa_enabled: false,
            subscription_status: "inactive".into(),
            subscription_expiry: None,
            payment_failed: false,
            xp: 0,
            level: 1,
            last_seen: None,
            metadata: "{}".into(),
            created_at: String::new(),
        }
    }

    #[test]
    fn board_name_falls_back_to_name_then_email() {
        assert_eq!(board_name(&user("neo", Some("Thomas"), "neo@zion.io")), "neo");
        assert_eq!(board_name(&user(" ", Some("Thomas"), "neo@zion.io")), "Thomas");
        assert_eq!(board_name(&user("", None, "neo@zion.io")), "neo");
        assert_eq!(board_name(&user("", Some(""), "@zion.io")), "User");
    }
}
