use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{ProjectImportRow, ProjectListQuery, ProjectRequest, ProjectSheetRow},
    repo::{self, Project},
};
use crate::{
    auth::extractors::AdminUser,
    categories::repo as categories,
    error::{AppError, AppJson, AppResult},
    images::{self, is_placeholder, read_image_field, PRESIGN_TTL, UPLOAD_BODY_LIMIT},
    response::{Envelope, ListEnvelope, Pagination},
    sheets::{self, CsvFile, IMPORT_BODY_LIMIT},
    state::AppState,
    validate::{self, slugify},
};

/// Reads are public, writes need `admin`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route(
            "/projects/:id/photo",
            get(photo_redirect)
                .put(upload_photo)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/categories/:id/projects",
            get(list_category_projects).post(create_category_project),
        )
        .route("/projects/export", get(export_projects))
        .route("/projects/export/:id", get(export_project))
        .route(
            "/projects/import",
            post(import_projects).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
}

pub(crate) fn project_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("Project not found with id of {}", id))
}

async fn create_in(state: &AppState, category_id: Uuid, payload: ProjectRequest) -> AppResult<Project> {
    let fields = payload.into_fields()?;
    if categories::find(&state.db, category_id).await?.is_none() {
        return Err(AppError::not_found(format!(
            "No category with the id of {}",
            category_id
        )));
    }
    let slug = slugify(&fields.name);
    let project = repo::create(&state.db, category_id, fields, slug).await?;
    info!(project_id = %project.id, %category_id, "project created");
    Ok(project)
}

#[instrument(skip(state))]
pub async fn list_projects(
    State(state): State<AppState>,
    Query(q): Query<ProjectListQuery>,
) -> AppResult<Json<ListEnvelope<Project>>> {
    let (rows, total) = repo::list(&state.db, q.category, q.page()).await?;
    Ok(Json(ListEnvelope::new(rows, Some(total))))
}

#[instrument(skip(state))]
pub async fn list_category_projects(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<ListEnvelope<Project>>> {
    let (rows, total) = repo::list(&state.db, Some(category_id), page.normalized()).await?;
    Ok(Json(ListEnvelope::new(rows, Some(total))))
}

#[instrument(skip(state))]
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Envelope<Project>>> {
    let project = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| project_not_found(id))?;
    Ok(Json(Envelope::ok(project)))
}

#[instrument(skip(state, _admin, payload))]
pub async fn create_project(
    State(state): State<AppState>,
    _admin: AdminUser,
    AppJson(payload): AppJson<ProjectRequest>,
) -> AppResult<(StatusCode, Json<Envelope<Project>>)> {
    let category_id = payload
        .category_id
        .ok_or_else(|| validate::missing("category"))?;
    let project = create_in(&state, category_id, payload).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(project))))
}

#[instrument(skip(state, _admin, payload))]
pub async fn create_category_project(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(category_id): Path<Uuid>,
    AppJson(payload): AppJson<ProjectRequest>,
) -> AppResult<(StatusCode, Json<Envelope<Project>>)> {
    let project = create_in(&state, category_id, payload).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(project))))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_project(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<ProjectRequest>,
) -> AppResult<Json<Envelope<Project>>> {
    let changes = payload.into_changes()?;
    let slug = changes.name.as_deref().map(slugify);
    let project = repo::update(&state.db, id, changes, slug)
        .await?
        .ok_or_else(|| project_not_found(id))?;
    Ok(Json(Envelope::ok(project)))
}

#[instrument(skip(state, _admin))]
pub async fn delete_project(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let project = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| project_not_found(id))?;
    repo::delete(&state.db, id).await?;
    if !is_placeholder(&project.photo) {
        if let Err(e) = state.storage.remove(&project.photo).await {
            warn!(error = %e, key = %project.photo, "failed to delete project photo");
        }
    }
    info!(project_id = %id, "project deleted");
    Ok(Json(json!({ "success": true, "data": {} })))
}

/// PUT /projects/:id/photo (multipart, field `file`)
#[instrument(skip(state, _admin, mp))]
pub async fn upload_photo(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> AppResult<Json<Envelope<String>>> {
    let upload = read_image_field(&mut mp, state.config.max_file_upload).await?;
    let project = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| project_not_found(id))?;

    let key = images::replace_photo(state.storage.as_ref(), "projects", id, &project.photo, upload).await?;
    repo::set_photo(&state.db, id, &key).await?;
    info!(project_id = %id, key = %key, "project photo updated");
    Ok(Json(Envelope::ok(key)))
}

/// GET /projects/:id/photo: 302 to a short-lived presigned URL.
#[instrument(skip(state))]
pub async fn photo_redirect(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Redirect> {
    let project = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| project_not_found(id))?;
    if is_placeholder(&project.photo) {
        return Err(AppError::not_found("Project has no photo"));
    }
    let url = state
        .storage
        .presigned_url(&project.photo, PRESIGN_TTL)
        .await
        .map_err(|e| AppError::dependency("Problem with file download", e))?;
    Ok(Redirect::temporary(&url))
}

#[instrument(skip(state, _admin))]
pub async fn export_projects(State(state): State<AppState>, _admin: AdminUser) -> AppResult<CsvFile> {
    let rows = repo::all(&state.db).await?;
    sheets::export("projects.csv", rows.into_iter().map(ProjectSheetRow::from))
}

#[instrument(skip(state, _admin))]
pub async fn export_project(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<CsvFile> {
    let project = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| project_not_found(id))?;
    sheets::export(format!("project_{}.csv", id), [ProjectSheetRow::from(project)])
}

/// POST /projects/import (multipart, field `file`). Each row names its `category_id`.
#[instrument(skip(state, _admin, mp))]
pub async fn import_projects(
    State(state): State<AppState>,
    _admin: AdminUser,
    mut mp: Multipart,
) -> AppResult<(StatusCode, Json<ListEnvelope<Project>>)> {
    let body = sheets::read_sheet_field(&mut mp).await?;
    let rows: Vec<ProjectImportRow> = sheets::parse(&body)?;
    let batch = sheets::convert_rows(rows, ProjectImportRow::into_new)?;
    let created = repo::create_many(&state.db, batch).await?;
    info!(count = created.len(), "projects imported");
    Ok((StatusCode::CREATED, Json(ListEnvelope::new(created, None))))
}
