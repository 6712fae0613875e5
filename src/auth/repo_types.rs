use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::{password::PasswordHash, roles::Role};

/// User record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub birthday: Option<OffsetDateTime>,
    pub city: String,
    pub province: String,
    pub address: String,
    pub phone: String,
    pub avatar: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    #[serde(skip_serializing)]
    pub reset_password_token: Option<String>, // SHA-256 of the mailed token
    #[serde(skip_serializing)]
    pub reset_password_expire: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Editable profile fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub birthday: Option<OffsetDateTime>,
    #[serde(skip)]
    pub avatar: Option<String>,
}

pub struct NewUser {
    pub email: String,
    pub password: PasswordHash,
    pub role: Role,
    pub profile: ProfileUpdate,
}

/// Changes an administrator may apply to any account.
#[derive(Debug, Default)]
pub struct AdminUserUpdate {
    pub email: Option<String>,
    pub role: Option<Role>,
    pub password: Option<PasswordHash>,
    pub profile: ProfileUpdate,
}

/// Filters for the admin user listing: case-insensitive substrings, plus an
/// exact calendar day (UTC) for `birthday`.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub name: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub birthday: Option<Date>,
}
