use serde::Serialize;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{error::AppResult, response::Pagination};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub photo: String,
    pub description: String,
    pub average_rating: Option<f64>,
    pub cost: f64,
    pub address: String,
    pub architecture: String,
    pub client: String,
    #[serde(with = "time::serde::rfc3339")]
    pub complete_day: OffsetDateTime,
    pub area: f64,
    pub category_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const PROJECT_COLUMNS: &str = "id, name, slug, photo, description, average_rating, cost, address, \
     architecture, client, complete_day, area, category_id, created_at";

#[derive(Debug)]
pub struct ProjectFields {
    pub name: String,
    pub description: String,
    pub cost: f64,
    pub address: String,
    pub architecture: String,
    pub client: String,
    pub complete_day: Option<OffsetDateTime>,
    pub area: f64,
}

#[derive(Debug, Default)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cost: Option<f64>,
    pub address: Option<String>,
    pub architecture: Option<String>,
    pub client: Option<String>,
    pub complete_day: Option<OffsetDateTime>,
    pub area: Option<f64>,
    pub category_id: Option<Uuid>,
}

pub async fn list(
    db: &PgPool,
    category_id: Option<Uuid>,
    page: Pagination,
) -> AppResult<(Vec<Project>, i64)> {
    let rows = sqlx::query_as::<_, Project>(&format!(
        r#"
        SELECT {PROJECT_COLUMNS}
        FROM projects
        WHERE ($1::uuid IS NULL OR category_id = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(category_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(db)
    .await?;
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM projects WHERE ($1::uuid IS NULL OR category_id = $1)",
    )
    .bind(category_id)
    .fetch_one(db)
    .await?;
    Ok((rows, total))
}

pub async fn find(db: &PgPool, id: Uuid) -> AppResult<Option<Project>> {
    let row = sqlx::query_as::<_, Project>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Every project, oldest first.
pub async fn all(db: &PgPool) -> AppResult<Vec<Project>> {
    let rows = sqlx::query_as::<_, Project>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

async fn insert<'e, E: PgExecutor<'e>>(
    exec: E,
    category_id: Uuid,
    fields: ProjectFields,
    slug: String,
) -> AppResult<Project> {
    let row = sqlx::query_as::<_, Project>(&format!(
        r#"
        INSERT INTO projects
            (name, slug, description, cost, address, architecture, client, complete_day, area, category_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, now()), $9, $10)
        RETURNING {PROJECT_COLUMNS}
        "#
    ))
    .bind(fields.name)
    .bind(slug)
    .bind(fields.description)
    .bind(fields.cost)
    .bind(fields.address)
    .bind(fields.architecture)
    .bind(fields.client)
    .bind(fields.complete_day)
    .bind(fields.area)
    .bind(category_id)
    .fetch_one(exec)
    .await?;
    Ok(row)
}

pub async fn create(
    db: &PgPool,
    category_id: Uuid,
    fields: ProjectFields,
    slug: String,
) -> AppResult<Project> {
    insert(db, category_id, fields, slug).await
}

/// A project parsed from an import file, ready to insert.
#[derive(Debug)]
pub struct NewProject {
    pub category_id: Uuid,
    pub fields: ProjectFields,
    pub slug: String,
}

/// Inserts every project or none of them. An unknown category fails the
/// whole batch with a foreign key violation.
pub async fn create_many(db: &PgPool, batch: Vec<NewProject>) -> AppResult<Vec<Project>> {
    let mut tx = db.begin().await?;
    let mut created = Vec::with_capacity(batch.len());
    for p in batch {
        created.push(insert(&mut *tx, p.category_id, p.fields, p.slug).await?);
    }
    tx.commit().await?;
    Ok(created)
}

pub async fn update(
    db: &PgPool,
    id: Uuid,
    changes: ProjectChanges,
    slug: Option<String>,
) -> AppResult<Option<Project>> {
    let row = sqlx::query_as::<_, Project>(&format!(
        r#"
        UPDATE projects SET
            name = COALESCE($2, name),
            slug = COALESCE($3, slug),
            description = COALESCE($4, description),
            cost = COALESCE($5, cost),
            address = COALESCE($6, address),
            architecture = COALESCE($7, architecture),
            client = COALESCE($8, client),
            complete_day = COALESCE($9, complete_day),
            area = COALESCE($10, area),
            category_id = COALESCE($11, category_id)
        WHERE id = $1
        RETURNING {PROJECT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(changes.name)
    .bind(slug)
    .bind(changes.description)
    .bind(changes.cost)
    .bind(changes.address)
    .bind(changes.architecture)
    .bind(changes.client)
    .bind(changes.complete_day)
    .bind(changes.area)
    .bind(changes.category_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn set_photo(db: &PgPool, id: Uuid, key: &str) -> AppResult<()> {
    sqlx::query("UPDATE projects SET photo = $2 WHERE id = $1")
        .bind(id)
        .bind(key)
        .execute(db)
        .await?;
    Ok(())
}

/// Reviews of the project go with it (`ON DELETE CASCADE`).
pub async fn delete(db: &PgPool, id: Uuid) -> AppResult<bool> {
    let res = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Sets `average_rating` to the mean of the project's review ratings, or NULL
/// when it has none. Runs inside the transaction that changed the reviews.
pub async fn recompute_average_rating(
    tx: &mut Transaction<'_, Postgres>,
    project_id: Uuid,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE projects
        SET average_rating = (
            SELECT AVG(rating)::float8 FROM reviews WHERE project_id = $1
        )
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
