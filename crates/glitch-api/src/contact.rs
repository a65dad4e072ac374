use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use glitch_types::api::{Ack, Claims, ContactMessageResponse, ContactRequest};
use glitch_types::models::Capability;

use crate::auth::non_empty;
use crate::error::{ApiError, Payload};
use crate::middleware::require_capability;
use crate::state::{AppState, with_db};

#[derive(Debug, Default, Deserialize)]
pub struct ContactIdQuery {
    pub id: Option<String>,
}

/// `POST /api/contact` (public).
pub async fn submit(
    State(state): State<AppState>,
    Payload(req): Payload<ContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(name), Some(email), Some(message)) =
        (non_empty(req.name), non_empty(req.email), non_empty(req.message))
    else {
        return Err(ApiError::bad_request("Name, email, and message are required"));
    };
    let subject = non_empty(req.subject).unwrap_or_default();

    let id = with_db(&state, move |db| db.insert_contact(&name, &email, &subject, &message)).await?;
    info!("Contact message {} received", id);

    Ok((
        StatusCode::OK,
        Json(Ack::ok("Contact message submitted successfully")),
    ))
}

/// `GET /api/admin/contact`, newest first.
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    require_capability(&state, &claims, Capability::ViewSupportTickets).await?;

    let rows = with_db(&state, |db| db.list_contacts()).await?;
    let messages: Vec<ContactMessageResponse> = rows
        .into_iter()
        .map(|row| ContactMessageResponse {
            id: row.id,
            name: row.name,
            email: row.email,
            subject: row.subject,
            message: row.message,
            created_at: row.created_at,
            read: row.is_read,
        })
        .collect();

    Ok(Json(messages))
}

/// `DELETE /api/admin/contact?id=` and `DELETE /api/contact?id=`
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ContactIdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_capability(&state, &claims, Capability::CloseTickets).await?;

    let id = parse_id(query.id)?;
    if !with_db(&state, move |db| db.delete_contact(id)).await? {
        return Err(ApiError::not_found("Message not found"));
    }

    info!("{} deleted contact message {}", claims.username, id);
    Ok(Json(Ack::ok("Contact message deleted successfully")))
}

/// `PUT /api/admin/contact/{id}/read`
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_capability(&state, &claims, Capability::RespondToTickets).await?;

    if !with_db(&state, move |db| db.mark_contact_read(id)).await? {
        return Err(ApiError::not_found("Message not found"));
    }
    Ok(Json(Ack::ok("Message marked as read")))
}

fn parse_id(raw: Option<String>) -> Result<i64, ApiError> {
    let raw = non_empty(raw).ok_or_else(|| ApiError::bad_request("Message ID is required"))?;
    raw.parse()
        .map_err(|_| ApiError::bad_request("Message ID must be a number"))
}
