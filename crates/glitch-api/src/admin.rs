use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tracing::info;

use glitch_db::models::UserRow;
use glitch_types::api::{
    Ack, AdminUser, Claims, DEFAULT_AVATAR, OnlineUser, SubscriptionCheckRequest,
    SubscriptionCheckResponse, UpdateRoleRequest, UserStatusResponse,
};
use glitch_types::models::{Capability, Role, SubscriptionStatus};

use crate::auth::subscription_lapsed;
use crate::error::{ApiError, Payload};
use crate::middleware::{capabilities, effective_role, load_caller, require_capability};
use crate::state::{AppState, AppStateInner, with_db};

/// A user counts as online when seen within this window.
pub fn online_window() -> Duration {
    Duration::minutes(5)
}

/// `GET /api/admin/user-status`
pub async fn user_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_capability(&state, &claims, Capability::ViewUsers).await?;

    let since = glitch_db::timestamp(Utc::now() - online_window());
    let (online, total) = with_db(&state, move |db| {
        Ok((db.online_users(&since)?, db.count_users()?))
    })
    .await?;

    let online_users = online
        .iter()
        .map(|u| OnlineUser {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            name: display_name(u),
            avatar: avatar(u),
            role: effective_role(&state, u),
            last_seen: u.last_seen.clone(),
        })
        .collect();

    Ok(Json(UserStatusResponse {
        success: true,
        online_users,
        total_users: total,
    }))
}

pub async fn subscription_check_query(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(req): Query<SubscriptionCheckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    subscription_check(&state, &claims, req).await
}

pub async fn subscription_check_body(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Payload(req): Payload<SubscriptionCheckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    subscription_check(&state, &claims, req).await
}

async fn subscription_check(
    state: &AppState,
    claims: &Claims,
    req: SubscriptionCheckRequest,
) -> Result<Json<SubscriptionCheckResponse>, ApiError> {
    let target_id = req.user_id.unwrap_or(claims.sub);
    if target_id != claims.sub {
        let caller = load_caller(state, claims).await?;
        if !caller.role.is_admin() {
            return Err(ApiError::forbidden("You can only check your own subscription"));
        }
    }

    let user = with_db(state, move |db| db.get_user_by_id(target_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let response = |active: bool, is_admin: bool, payment_failed: bool, message: Option<&str>| {
        SubscriptionCheckResponse {
            success: true,
            has_active_subscription: active,
            is_admin,
            payment_failed,
            expiry: user.subscription_expiry.clone(),
            message: message.map(str::to_string),
        }
    };

    if effective_role(state, &user).is_admin() {
        return Ok(Json(response(true, true, false, None)));
    }
    if user.payment_failed {
        return Ok(Json(response(
            false,
            false,
            true,
            Some("Your payment has failed. Please update your payment method to continue using the community."),
        )));
    }

    let expired = "Your subscription has expired. Please renew to continue using the community.";
    match SubscriptionStatus::parse_lenient(Some(&user.subscription_status)) {
        SubscriptionStatus::Active if subscription_lapsed(&user) => {
            let id = user.id;
            with_db(state, move |db| {
                db.set_subscription_status(id, SubscriptionStatus::Expired.as_str())
            })
            .await?;
            Ok(Json(response(false, false, false, Some(expired))))
        }
        SubscriptionStatus::Active => Ok(Json(response(true, false, false, None))),
        SubscriptionStatus::Expired => Ok(Json(response(false, false, false, Some(expired)))),
        SubscriptionStatus::Inactive => Ok(Json(response(
            false,
            false,
            false,
            Some("You need an active subscription to access the community."),
        ))),
    }
}

/// `GET /api/admin/users`
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_capability(&state, &claims, Capability::ViewUsers).await?;

    let users = with_db(&state, |db| db.list_users()).await?;
    let users: Vec<AdminUser> = users.iter().map(|u| admin_user(&state, u)).collect();

    Ok(Json(json!({
        "success": true,
        "count": users.len(),
        "users": users,
    })))
}

/// `DELETE /api/admin/users/{id}`
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = require_capability(&state, &claims, Capability::EditUsers).await?;

    if user_id == caller.user.id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let target = with_db(&state, move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let target_role = effective_role(&state, &target);
    if target_role == Role::SuperAdmin {
        return Err(ApiError::forbidden("The super admin account cannot be deleted"));
    }
    if target_role.is_admin() && !caller.is_super_admin() {
        return Err(ApiError::forbidden("Only the super admin can delete admins"));
    }

    if !with_db(&state, move |db| db.delete_user(user_id)).await? {
        return Err(ApiError::not_found("User not found"));
    }

    info!(
        "{} deleted user {} ({})",
        caller.user.username, target.username, target.id
    );
    Ok(Json(Ack::ok("User deleted successfully")))
}

/// `PUT /api/admin/users/{id}/role`
pub async fn update_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<i64>,
    Payload(req): Payload<UpdateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = require_capability(&state, &claims, Capability::AssignRoles).await?;

    let role: Role = req
        .role
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid role: {}", req.role)))?;

    let requested: Vec<Capability> = req
        .capabilities
        .unwrap_or_default()
        .iter()
        .map(|name| {
            name.parse()
                .map_err(|_| ApiError::bad_request(format!("Unknown capability: {}", name)))
        })
        .collect::<Result<_, _>>()?;

    let target = with_db(&state, move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if effective_role(&state, &target) == Role::SuperAdmin {
        return Err(ApiError::forbidden("The super admin's role cannot be changed"));
    }
    if role.is_admin() && !caller.is_super_admin() {
        return Err(ApiError::forbidden("Only the super admin can grant admin roles"));
    }

    let capability_names: Vec<&str> = match role {
        Role::Admin if requested.is_empty() => {
            Capability::admin_defaults().iter().map(|c| c.as_str()).collect()
        }
        Role::Admin | Role::SuperAdmin => requested.iter().map(|c| c.as_str()).collect(),
        Role::Free | Role::Premium => Vec::new(),
    };
    let metadata = merged_metadata(&target.metadata, &capability_names);

    let role_name = role.as_str();
    with_db(&state, move |db| db.update_role(user_id, role_name, &metadata)).await?;

    info!(
        "{} set role of {} ({}) to {}",
        caller.user.username, target.username, target.id, role
    );
    Ok(Json(json!({
        "success": true,
        "message": "Role updated successfully",
        "user": {
            "id": target.id,
            "role": role,
            "capabilities": capability_names,
        },
    })))
}

/// Replace the `capabilities` key, keeping anything else stored in metadata.
fn merged_metadata(existing: &str, capabilities: &[&str]) -> String {
    let mut value = serde_json::from_str::<Value>(existing)
        .ok()
        .filter(Value::is_object)
        .unwrap_or_else(|| json!({}));
    value["capabilities"] = json!(capabilities);
    value.to_string()
}

fn admin_user(state: &AppStateInner, user: &UserRow) -> AdminUser {
    let role = effective_role(state, user);
    AdminUser {
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        name: display_name(user),
        avatar: avatar(user),
        role,
        capabilities: capabilities(role, &user.metadata)
            .iter()
            .map(|c| c.as_str().to_string())
            .collect(),
        mfa_enabled: user.mfa_enabled,
        subscription_status: user.subscription_status.clone(),
        payment_failed: user.payment_failed,
        created_at: user.created_at.clone(),
        last_seen: user.last_seen.clone(),
    }
}

pub(crate) fn display_name(user: &UserRow) -> String {
    user.name.clone().unwrap_or_else(|| user.username.clone())
}

pub(crate) fn avatar(user: &UserRow) -> String {
    user.avatar
        .clone()
        .unwrap_or_else(|| DEFAULT_AVATAR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_metadata_keeps_other_keys() {
        let merged = merged_metadata(r#"{"theme":"dark","capabilities":["x"]}"#, &["view_users"]);
        let value: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(value["theme"], "dark");
        assert_eq!(value["capabilities"], json!(["view_users"]));

        let fresh: Value = serde_json::from_str(&merged_metadata("not json", &[])).unwrap();
        assert_eq!(fresh["capabilities"], json!([]));
    }
}
