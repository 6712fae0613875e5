use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{error::AppResult, response::Pagination};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
    pub is_contacted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const MESSAGE_COLUMNS: &str = "id, name, email, phone, message, is_contacted, created_at";

#[derive(Debug)]
pub struct NewMessage {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct MessageChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub is_contacted: Option<bool>,
}

pub async fn list(
    db: &PgPool,
    contacted: Option<bool>,
    page: Pagination,
) -> AppResult<(Vec<Message>, i64)> {
    let rows = sqlx::query_as::<_, Message>(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM messages
        WHERE ($1::bool IS NULL OR is_contacted = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(contacted)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(db)
    .await?;
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM messages WHERE ($1::bool IS NULL OR is_contacted = $1)",
    )
    .bind(contacted)
    .fetch_one(db)
    .await?;
    Ok((rows, total))
}

pub async fn find(db: &PgPool, id: Uuid) -> AppResult<Option<Message>> {
    let row = sqlx::query_as::<_, Message>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn create(db: &PgPool, new: NewMessage) -> AppResult<Message> {
    let row = sqlx::query_as::<_, Message>(&format!(
        r#"
        INSERT INTO messages (name, email, phone, message)
        VALUES ($1, $2, $3, $4)
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(new.name)
    .bind(new.email)
    .bind(new.phone)
    .bind(new.message)
    .fetch_one(db)
    .await?;
    Ok(row)
}

pub async fn update(db: &PgPool, id: Uuid, changes: MessageChanges) -> AppResult<Option<Message>> {
    let row = sqlx::query_as::<_, Message>(&format!(
        r#"
        UPDATE messages SET
            name = COALESCE($2, name),
            email = COALESCE($3, email),
            phone = COALESCE($4, phone),
            message = COALESCE($5, message),
            is_contacted = COALESCE($6, is_contacted)
        WHERE id = $1
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(changes.name)
    .bind(changes.email)
    .bind(changes.phone)
    .bind(changes.message)
    .bind(changes.is_contacted)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn delete(db: &PgPool, id: Uuid) -> AppResult<bool> {
    let res = sqlx::query("DELETE FROM messages WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}
