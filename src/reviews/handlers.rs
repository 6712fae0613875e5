use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{ReviewImportRow, ReviewRequest, ReviewSheetRow},
    repo::{self, Review},
};
use crate::{
    auth::{
        extractors::{ensure_owner_or_admin, AdminUser, CurrentUser},
        roles::Role,
    },
    error::{AppError, AppJson, AppResult},
    projects::repo as projects,
    response::{Envelope, ListEnvelope, Pagination},
    sheets::{self, CsvFile, IMPORT_BODY_LIMIT},
    state::AppState,
};

const REVIEWERS: &[Role] = &[Role::User, Role::Admin];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reviews", get(list_reviews))
        .route(
            "/reviews/:id",
            get(get_review).put(update_review).delete(delete_review),
        )
        .route(
            "/projects/:id/reviews",
            get(list_project_reviews).post(add_review),
        )
        .route("/reviews/export", get(export_reviews))
        .route("/reviews/export/:id", get(export_review))
        .route(
            "/reviews/import",
            post(import_reviews).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
}

fn review_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("No review found with the id of {}", id))
}

#[instrument(skip(state))]
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<ListEnvelope<Review>>> {
    let (rows, total) = repo::list(&state.db, None, page.normalized()).await?;
    Ok(Json(ListEnvelope::new(rows, Some(total))))
}

#[instrument(skip(state))]
pub async fn list_project_reviews(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<ListEnvelope<Review>>> {
    let (rows, total) = repo::list(&state.db, Some(project_id), page.normalized()).await?;
    Ok(Json(ListEnvelope::new(rows, Some(total))))
}

#[instrument(skip(state))]
pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Envelope<Review>>> {
    let review = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| review_not_found(id))?;
    Ok(Json(Envelope::ok(review)))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id()))]
pub async fn add_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(project_id): Path<Uuid>,
    AppJson(payload): AppJson<ReviewRequest>,
) -> AppResult<(StatusCode, Json<Envelope<Review>>)> {
    user.authorize(REVIEWERS)?;
    let fields = payload.into_fields()?;
    if projects::find(&state.db, project_id).await?.is_none() {
        return Err(AppError::not_found(format!(
            "No project with the id of {}",
            project_id
        )));
    }
    let review = repo::create(&state.db, project_id, user.id(), fields).await?;
    info!(review_id = %review.id, %project_id, "review added");
    Ok((StatusCode::CREATED, Json(Envelope::ok(review))))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id()))]
pub async fn update_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<ReviewRequest>,
) -> AppResult<Json<Envelope<Review>>> {
    user.authorize(REVIEWERS)?;
    let changes = payload.into_changes()?;
    let existing = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| review_not_found(id))?;
    ensure_owner_or_admin(existing.user_id, &user)?;

    let review = repo::update(&state.db, id, changes)
        .await?
        .ok_or_else(|| review_not_found(id))?;
    Ok(Json(Envelope::ok(review)))
}

#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn delete_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    user.authorize(REVIEWERS)?;
    let review = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| review_not_found(id))?;
    ensure_owner_or_admin(review.user_id, &user)?;

    repo::delete(&state.db, &review).await?;
    info!(review_id = %id, "review deleted");
    Ok(Json(json!({ "success": true, "data": {} })))
}

#[instrument(skip(state, _admin))]
pub async fn export_reviews(State(state): State<AppState>, _admin: AdminUser) -> AppResult<CsvFile> {
    let rows = repo::all(&state.db).await?;
    sheets::export("reviews.csv", rows.into_iter().map(ReviewSheetRow::from))
}

#[instrument(skip(state, _admin))]
pub async fn export_review(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<CsvFile> {
    let review = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| review_not_found(id))?;
    sheets::export(format!("review_{}.csv", id), [ReviewSheetRow::from(review)])
}

/// POST /reviews/import (multipart, field `file`). Rows name their project and author.
#[instrument(skip(state, _admin, mp))]
pub async fn import_reviews(
    State(state): State<AppState>,
    _admin: AdminUser,
    mut mp: Multipart,
) -> AppResult<(StatusCode, Json<ListEnvelope<Review>>)> {
    let body = sheets::read_sheet_field(&mut mp).await?;
    let rows: Vec<ReviewImportRow> = sheets::parse(&body)?;
    let batch = sheets::convert_rows(rows, ReviewImportRow::into_new)?;
    let created = repo::create_many(&state.db, batch).await?;
    info!(count = created.len(), "reviews imported");
    Ok((StatusCode::CREATED, Json(ListEnvelope::new(created, None))))
}
