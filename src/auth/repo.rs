use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    password::PasswordHash,
    repo_types::{AdminUserUpdate, NewUser, ProfileUpdate, User, UserFilter},
};
use crate::{error::AppResult, response::Pagination};

/// Credential store. Owns user records; every password it persists has
/// already gone through [`PasswordHash::from_plaintext`].
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// User whose stored reset hash equals `hash` and whose expiry is after `now`.
    async fn find_by_reset_token(&self, hash: &str, now: OffsetDateTime)
        -> AppResult<Option<User>>;

    async fn create(&self, user: NewUser) -> AppResult<User>;

    /// Inserts every user or none of them.
    async fn create_many(&self, users: Vec<NewUser>) -> AppResult<Vec<User>>;

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<Option<User>>;

    /// A new password also clears any pending reset token.
    async fn admin_update(&self, id: Uuid, update: AdminUserUpdate) -> AppResult<Option<User>>;

    /// Replaces the password hash and clears any pending reset token in the
    /// same write. Returns `false` if the user does not exist.
    async fn set_password(&self, id: Uuid, password: PasswordHash) -> AppResult<bool>;

    /// Stores (or with `None`, clears) the reset hash and expiry. Touches no
    /// other column.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<(String, OffsetDateTime)>,
    ) -> AppResult<()>;

    async fn list(&self, filter: UserFilter, page: Pagination) -> AppResult<(Vec<User>, i64)>;

    /// Every user, oldest first. Used by the spreadsheet export.
    async fn all(&self) -> AppResult<Vec<User>>;

    async fn delete(&self, id: Uuid) -> AppResult<bool>;
}

const USER_COLUMNS: &str = "id, name, email, birthday, city, province, address, phone, avatar, \
     role, password_hash, reset_password_token, reset_password_expire, created_at";

const FILTER_CLAUSE: &str = r#"
    ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
    AND ($2::text IS NULL OR email ILIKE '%' || $2 || '%')
    AND ($3::text IS NULL OR city ILIKE '%' || $3 || '%')
    AND ($4::text IS NULL OR address ILIKE '%' || $4 || '%')
    AND ($5::text IS NULL OR phone ILIKE '%' || $5 || '%')
    AND ($6::date IS NULL OR (birthday AT TIME ZONE 'UTC')::date = $6)
"#;

async fn insert_user<'e, E: PgExecutor<'e>>(exec: E, user: NewUser) -> AppResult<User> {
    let NewUser {
        email,
        password,
        role,
        profile,
    } = user;
    let created = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (email, password_hash, role, name, city, province, address, phone, birthday)
        VALUES ($1, $2, $3,
                COALESCE($4, ''), COALESCE($5, ''), COALESCE($6, ''),
                COALESCE($7, ''), COALESCE($8, ''), $9)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(email)
    .bind(password.into_string())
    .bind(role)
    .bind(profile.name)
    .bind(profile.city)
    .bind(profile.province)
    .bind(profile.address)
    .bind(profile.phone)
    .bind(profile.birthday)
    .fetch_one(exec)
    .await?;
    Ok(created)
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_reset_token(
        &self,
        hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE reset_password_token = $1
              AND reset_password_expire > $2
            "#
        ))
        .bind(hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        insert_user(&self.db, user).await
    }

    async fn create_many(&self, users: Vec<NewUser>) -> AppResult<Vec<User>> {
        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(users.len());
        for user in users {
            created.push(insert_user(&mut *tx, user).await?);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                city = COALESCE($3, city),
                province = COALESCE($4, province),
                address = COALESCE($5, address),
                phone = COALESCE($6, phone),
                birthday = COALESCE($7, birthday),
                avatar = COALESCE($8, avatar)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.city)
        .bind(update.province)
        .bind(update.address)
        .bind(update.phone)
        .bind(update.birthday)
        .bind(update.avatar)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn admin_update(&self, id: Uuid, update: AdminUserUpdate) -> AppResult<Option<User>> {
        let AdminUserUpdate {
            email,
            role,
            password,
            profile,
        } = update;
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                role = COALESCE($3, role),
                password_hash = COALESCE($4, password_hash),
                reset_password_token = CASE WHEN $4::text IS NULL THEN reset_password_token END,
                reset_password_expire = CASE WHEN $4::text IS NULL THEN reset_password_expire END,
                name = COALESCE($5, name),
                city = COALESCE($6, city),
                province = COALESCE($7, province),
                address = COALESCE($8, address),
                phone = COALESCE($9, phone),
                birthday = COALESCE($10, birthday)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(email)
        .bind(role)
        .bind(password.map(PasswordHash::into_string))
        .bind(profile.name)
        .bind(profile.city)
        .bind(profile.province)
        .bind(profile.address)
        .bind(profile.phone)
        .bind(profile.birthday)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn set_password(&self, id: Uuid, password: PasswordHash) -> AppResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2,
                   reset_password_token = NULL,
                   reset_password_expire = NULL
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password.into_string())
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<(String, OffsetDateTime)>,
    ) -> AppResult<()> {
        let (hash, expire) = token.unzip();
        sqlx::query(
            r#"
            UPDATE users
               SET reset_password_token = $2,
                   reset_password_expire = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(hash)
        .bind(expire)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list(&self, filter: UserFilter, page: Pagination) -> AppResult<(Vec<User>, i64)> {
        let page = page.normalized();
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE {FILTER_CLAUSE}
            ORDER BY created_at DESC
            LIMIT $7 OFFSET $8
            "#
        ))
        .bind(&filter.name)
        .bind(&filter.email)
        .bind(&filter.city)
        .bind(&filter.address)
        .bind(&filter.phone)
        .bind(filter.birthday)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM users WHERE {FILTER_CLAUSE}"
        ))
        .bind(&filter.name)
        .bind(&filter.email)
        .bind(&filter.city)
        .bind(&filter.address)
        .bind(&filter.phone)
        .bind(filter.birthday)
        .fetch_one(&self.db)
        .await?;

        Ok((users, total))
    }

    async fn all(&self) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
