use std::collections::BTreeSet;

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{error::AppResult, projects::repo::recompute_average_rating, response::Pagination};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub title: String,
    pub comment: String,
    pub rating: i32,
    pub project_id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const REVIEW_COLUMNS: &str = "id, title, comment, rating, project_id, user_id, created_at";

#[derive(Debug)]
pub struct ReviewFields {
    pub title: String,
    pub comment: String,
    pub rating: i32,
}

#[derive(Debug, Default)]
pub struct ReviewChanges {
    pub title: Option<String>,
    pub comment: Option<String>,
    pub rating: Option<i32>,
}

pub async fn list(
    db: &PgPool,
    project_id: Option<Uuid>,
    page: Pagination,
) -> AppResult<(Vec<Review>, i64)> {
    let rows = sqlx::query_as::<_, Review>(&format!(
        r#"
        SELECT {REVIEW_COLUMNS}
        FROM reviews
        WHERE ($1::uuid IS NULL OR project_id = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(project_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(db)
    .await?;
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM reviews WHERE ($1::uuid IS NULL OR project_id = $1)",
    )
    .bind(project_id)
    .fetch_one(db)
    .await?;
    Ok((rows, total))
}

pub async fn find(db: &PgPool, id: Uuid) -> AppResult<Option<Review>> {
    let row = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Every review, oldest first.
pub async fn all(db: &PgPool) -> AppResult<Vec<Review>> {
    let rows = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews ORDER BY created_at"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// A review parsed from an import file.
#[derive(Debug)]
pub struct NewReview {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub fields: ReviewFields,
}

// Every write below recomputes the project's average in the same transaction.

pub async fn create(
    db: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
    fields: ReviewFields,
) -> AppResult<Review> {
    let mut tx = db.begin().await?;
    let review = sqlx::query_as::<_, Review>(&format!(
        r#"
        INSERT INTO reviews (title, comment, rating, project_id, user_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {REVIEW_COLUMNS}
        "#
    ))
    .bind(fields.title)
    .bind(fields.comment)
    .bind(fields.rating)
    .bind(project_id)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;
    recompute_average_rating(&mut tx, project_id).await?;
    tx.commit().await?;
    Ok(review)
}

pub async fn update(db: &PgPool, id: Uuid, changes: ReviewChanges) -> AppResult<Option<Review>> {
    let mut tx = db.begin().await?;
    let review = sqlx::query_as::<_, Review>(&format!(
        r#"
        UPDATE reviews SET
            title = COALESCE($2, title),
            comment = COALESCE($3, comment),
            rating = COALESCE($4, rating)
        WHERE id = $1
        RETURNING {REVIEW_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(changes.title)
    .bind(changes.comment)
    .bind(changes.rating)
    .fetch_optional(&mut *tx)
    .await?;
    if let Some(r) = &review {
        recompute_average_rating(&mut tx, r.project_id).await?;
    }
    tx.commit().await?;
    Ok(review)
}

pub async fn delete(db: &PgPool, review: &Review) -> AppResult<()> {
    let mut tx = db.begin().await?;
    sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(review.id)
        .execute(&mut *tx)
        .await?;
    recompute_average_rating(&mut tx, review.project_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Inserts every review or none of them, then refreshes the average of each
/// project touched.
pub async fn create_many(db: &PgPool, batch: Vec<NewReview>) -> AppResult<Vec<Review>> {
    let mut tx = db.begin().await?;
    let mut created = Vec::with_capacity(batch.len());
    let mut touched = BTreeSet::new();
    for r in batch {
        let review = sqlx::query_as::<_, Review>(&format!(
            r#"
            INSERT INTO reviews (title, comment, rating, project_id, user_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(r.fields.title)
        .bind(r.fields.comment)
        .bind(r.fields.rating)
        .bind(r.project_id)
        .bind(r.user_id)
        .fetch_one(&mut *tx)
        .await?;
        touched.insert(review.project_id);
        created.push(review);
    }
    for project_id in touched {
        recompute_average_rating(&mut tx, project_id).await?;
    }
    tx.commit().await?;
    Ok(created)
}
