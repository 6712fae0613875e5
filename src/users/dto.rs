use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::{
    auth::{
        repo_types::{User, UserFilter},
        roles::Role,
    },
    error::AppResult,
    response::Pagination,
    sheets::SheetRow,
    validate,
};

/// Query string of `GET /users`: substring filters, a birthday, and paging.
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub name: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub birthday: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl UserListQuery {
    pub fn split(self) -> AppResult<(UserFilter, Pagination)> {
        let defaults = Pagination::default();
        let page = Pagination {
            limit: self.limit.unwrap_or(defaults.limit),
            offset: self.offset.unwrap_or(defaults.offset),
        }
        .normalized();
        let blank_is_none = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let birthday = blank_is_none(self.birthday)
            .map(|raw| validate::calendar_date(&raw, "birthday"))
            .transpose()?;
        let filter = UserFilter {
            name: blank_is_none(self.name),
            email: blank_is_none(self.email),
            city: blank_is_none(self.city),
            address: blank_is_none(self.address),
            phone: blank_is_none(self.phone),
            birthday,
        };
        Ok((filter, page))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub birthday: Option<OffsetDateTime>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub birthday: Option<OffsetDateTime>,
}

/// One record of a user import. Columns are matched by header name.
#[derive(Debug, Deserialize)]
pub struct UserImportRow {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub birthday: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl UserImportRow {
    pub fn into_request(self) -> AppResult<CreateUserRequest> {
        Ok(CreateUserRequest {
            birthday: validate::optional_day(self.birthday, "birthday")?,
            email: self.email,
            password: self.password,
            role: self.role,
            name: self.name,
            city: self.city,
            province: self.province,
            address: self.address,
            phone: self.phone,
        })
    }
}

/// One exported user. Credentials never leave the database.
#[derive(Debug, Serialize)]
pub struct UserSheetRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub birthday: String,
    pub city: String,
    pub province: String,
    pub address: String,
    pub phone: String,
    pub role: Role,
    pub created_at: String,
}

impl SheetRow for UserSheetRow {
    const HEADERS: &'static [&'static str] = &[
        "id", "name", "email", "birthday", "city", "province", "address", "phone", "role",
        "created_at",
    ];
}

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_default()
}

impl From<User> for UserSheetRow {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            birthday: u.birthday.map(rfc3339).unwrap_or_default(),
            city: u.city,
            province: u.province,
            address: u.address,
            phone: u.phone,
            role: u.role,
            created_at: rfc3339(u.created_at),
        }
    }
}
