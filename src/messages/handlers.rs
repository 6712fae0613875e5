use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{MessageListQuery, MessageRequest},
    repo::{self, Message},
};
use crate::{
    auth::extractors::AdminUser,
    error::{AppError, AppJson, AppResult},
    response::{Envelope, ListEnvelope},
    state::AppState,
};

/// Posting the contact form is public, the inbox is `admin` only.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/messages", get(list_messages).post(create_message))
        .route(
            "/messages/:id",
            get(get_message).put(update_message).delete(delete_message),
        )
}

fn message_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("Message not found with id of {}", id))
}

#[instrument(skip(state, _admin))]
pub async fn list_messages(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(q): Query<MessageListQuery>,
) -> AppResult<Json<ListEnvelope<Message>>> {
    let (rows, total) = repo::list(&state.db, q.contacted, q.page()).await?;
    Ok(Json(ListEnvelope::new(rows, Some(total))))
}

#[instrument(skip(state, _admin))]
pub async fn get_message(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Envelope<Message>>> {
    let message = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| message_not_found(id))?;
    Ok(Json(Envelope::ok(message)))
}

#[instrument(skip(state, payload))]
pub async fn create_message(
    State(state): State<AppState>,
    AppJson(payload): AppJson<MessageRequest>,
) -> AppResult<(StatusCode, Json<Envelope<Message>>)> {
    let new = payload.into_new()?;
    let message = repo::create(&state.db, new).await?;
    info!(message_id = %message.id, "contact message received");
    Ok((StatusCode::CREATED, Json(Envelope::ok(message))))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_message(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<MessageRequest>,
) -> AppResult<Json<Envelope<Message>>> {
    let changes = payload.into_changes()?;
    let message = repo::update(&state.db, id, changes)
        .await?
        .ok_or_else(|| message_not_found(id))?;
    Ok(Json(Envelope::ok(message)))
}

#[instrument(skip(state, _admin))]
pub async fn delete_message(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    if !repo::delete(&state.db, id).await? {
        return Err(message_not_found(id));
    }
    info!(message_id = %id, "message deleted");
    Ok(Json(json!({ "success": true, "data": {} })))
}
