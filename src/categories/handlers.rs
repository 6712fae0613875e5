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
    dto::{CategoryRequest, CategorySheetRow},
    repo::{self, Category},
};
use crate::{
    auth::extractors::AdminUser,
    error::{AppError, AppJson, AppResult},
    response::{Envelope, ListEnvelope, Pagination},
    sheets::{self, CsvFile, IMPORT_BODY_LIMIT},
    state::AppState,
    validate::slugify,
};

/// Reads are public, writes need `admin`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
        .route("/categories/export", get(export_categories))
        .route("/categories/export/:id", get(export_category))
        .route(
            "/categories/import",
            post(import_categories).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
}

pub(crate) fn category_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("Category not found with id of {}", id))
}

#[instrument(skip(state))]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<ListEnvelope<Category>>> {
    let (rows, total) = repo::list(&state.db, page.normalized()).await?;
    Ok(Json(ListEnvelope::new(rows, Some(total))))
}

#[instrument(skip(state))]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Envelope<Category>>> {
    let category = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| category_not_found(id))?;
    Ok(Json(Envelope::ok(category)))
}

#[instrument(skip(state, _admin, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    AppJson(payload): AppJson<CategoryRequest>,
) -> AppResult<(StatusCode, Json<Envelope<Category>>)> {
    let fields = payload.into_fields()?;
    let slug = slugify(&fields.name);
    let category = repo::create(&state.db, fields, slug).await?;
    info!(category_id = %category.id, "category created");
    Ok((StatusCode::CREATED, Json(Envelope::ok(category))))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<CategoryRequest>,
) -> AppResult<Json<Envelope<Category>>> {
    let changes = payload.into_changes()?;
    let slug = changes.name.as_deref().map(slugify);
    let category = repo::update(&state.db, id, changes, slug)
        .await?
        .ok_or_else(|| category_not_found(id))?;
    Ok(Json(Envelope::ok(category)))
}

#[instrument(skip(state, _admin))]
pub async fn delete_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    if !repo::delete(&state.db, id).await? {
        return Err(category_not_found(id));
    }
    info!(category_id = %id, "category deleted");
    Ok(Json(json!({ "success": true, "data": {} })))
}

#[instrument(skip(state, _admin))]
pub async fn export_categories(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<CsvFile> {
    let rows = repo::all(&state.db).await?;
    sheets::export("categories.csv", rows.into_iter().map(CategorySheetRow::from))
}

#[instrument(skip(state, _admin))]
pub async fn export_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<CsvFile> {
    let category = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| category_not_found(id))?;
    sheets::export(format!("category_{}.csv", id), [CategorySheetRow::from(category)])
}

/// POST /categories/import (multipart, field `file`, columns `name,description`)
#[instrument(skip(state, _admin, mp))]
pub async fn import_categories(
    State(state): State<AppState>,
    _admin: AdminUser,
    mut mp: Multipart,
) -> AppResult<(StatusCode, Json<ListEnvelope<Category>>)> {
    let body = sheets::read_sheet_field(&mut mp).await?;
    let rows: Vec<CategoryRequest> = sheets::parse(&body)?;
    let batch = sheets::convert_rows(rows, |row| {
        let fields = row.into_fields()?;
        let slug = slugify(&fields.name);
        Ok((fields, slug))
    })?;
    let created = repo::create_many(&state.db, batch).await?;
    info!(count = created.len(), "categories imported");
    Ok((StatusCode::CREATED, Json(ListEnvelope::new(created, None))))
}
