use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use glitch_db::models::UserRow;
use glitch_types::api::Claims;
use glitch_types::models::{Capability, Role};

use crate::error::ApiError;
use crate::state::{AppState, AppStateInner, with_db};
use crate::tokens;

/// Extract and validate the session JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = claims_from_headers(&state, req.headers())?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn claims_from_headers(state: &AppStateInner, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".into()))?;

    tokens::verify_session_token(&state.jwt_secret, token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))
}

/// Role stored on the row, promoted to super admin for the configured email.
pub fn effective_role(state: &AppStateInner, user: &UserRow) -> Role {
    if state.is_super_admin_email(&user.email) {
        Role::SuperAdmin
    } else {
        Role::parse_lenient(&user.role)
    }
}

/// Capabilities stored in the user's metadata. Admins without an explicit
/// list get the default admin set; super admins hold everything.
pub fn capabilities(role: Role, metadata: &str) -> Vec<Capability> {
    match role {
        Role::SuperAdmin => Capability::all().to_vec(),
        Role::Admin => {
            let stored = stored_capabilities(metadata);
            if stored.is_empty() {
                Capability::admin_defaults().to_vec()
            } else {
                stored
            }
        }
        Role::Free | Role::Premium => Vec::new(),
    }
}

fn stored_capabilities(metadata: &str) -> Vec<Capability> {
    serde_json::from_str::<Value>(metadata)
        .ok()
        .and_then(|v| v.get("capabilities").cloned())
        .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
        .unwrap_or_default()
        .iter()
        .filter_map(|name| name.parse().ok())
        .collect()
}

/// The caller as currently stored, with their effective role.
pub struct Caller {
    pub user: UserRow,
    pub role: Role,
}

impl Caller {
    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    pub fn has(&self, capability: Capability) -> bool {
        capabilities(self.role, &self.user.metadata).contains(&capability)
    }
}

/// Reload the token's user so role changes apply without a new login.
pub async fn load_caller(state: &AppState, claims: &Claims) -> Result<Caller, ApiError> {
    let id = claims.sub;
    let user = with_db(state, move |db| db.get_user_by_id(id))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".into()))?;
    let role = effective_role(state, &user);
    Ok(Caller { user, role })
}

/// Admin role plus the named capability.
pub async fn require_capability(
    state: &AppState,
    claims: &Claims,
    capability: Capability,
) -> Result<Caller, ApiError> {
    let caller = load_caller(state, claims).await?;
    if !caller.role.is_admin() {
        return Err(ApiError::forbidden("Admin access required"));
    }
    if !caller.has(capability) {
        return Err(ApiError::forbidden(format!(
            "Missing required permission: {}",
            capability.as_str()
        )));
    }
    Ok(caller)
}
