use serde::Serialize;
use sqlx::{FromRow, PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{error::AppResult, response::Pagination};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub image: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct CategoryFields {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Default)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub async fn list(db: &PgPool, page: Pagination) -> AppResult<(Vec<Category>, i64)> {
    let rows = sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name, slug, image, description, created_at
        FROM categories
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(db)
    .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
        .fetch_one(db)
        .await?;
    Ok((rows, total))
}

pub async fn find(db: &PgPool, id: Uuid) -> AppResult<Option<Category>> {
    let row = sqlx::query_as::<_, Category>(
        "SELECT id, name, slug, image, description, created_at FROM categories WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Every category, oldest first.
pub async fn all(db: &PgPool) -> AppResult<Vec<Category>> {
    let rows = sqlx::query_as::<_, Category>(
        "SELECT id, name, slug, image, description, created_at FROM categories ORDER BY created_at",
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

async fn insert<'e, E: PgExecutor<'e>>(
    exec: E,
    fields: CategoryFields,
    slug: String,
) -> AppResult<Category> {
    let row = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name, slug, description)
        VALUES ($1, $2, $3)
        RETURNING id, name, slug, image, description, created_at
        "#,
    )
    .bind(fields.name)
    .bind(slug)
    .bind(fields.description)
    .fetch_one(exec)
    .await?;
    Ok(row)
}

pub async fn create(db: &PgPool, fields: CategoryFields, slug: String) -> AppResult<Category> {
    insert(db, fields, slug).await
}

/// Inserts every category or none of them.
pub async fn create_many(
    db: &PgPool,
    batch: Vec<(CategoryFields, String)>,
) -> AppResult<Vec<Category>> {
    let mut tx = db.begin().await?;
    let mut created = Vec::with_capacity(batch.len());
    for (fields, slug) in batch {
        created.push(insert(&mut *tx, fields, slug).await?);
    }
    tx.commit().await?;
    Ok(created)
}

pub async fn update(
    db: &PgPool,
    id: Uuid,
    changes: CategoryChanges,
    slug: Option<String>,
) -> AppResult<Option<Category>> {
    let row = sqlx::query_as::<_, Category>(
        r#"
        UPDATE categories SET
            name = COALESCE($2, name),
            slug = COALESCE($3, slug),
            description = COALESCE($4, description)
        WHERE id = $1
        RETURNING id, name, slug, image, description, created_at
        "#,
    )
    .bind(id)
    .bind(changes.name)
    .bind(slug)
    .bind(changes.description)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Projects of the category go with it (`ON DELETE CASCADE`).
pub async fn delete(db: &PgPool, id: Uuid) -> AppResult<bool> {
    let res = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}
