use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{CreateUserRequest, UpdateUserRequest, UserImportRow};
use crate::{
    auth::{
        password::PasswordHash,
        repo_types::{AdminUserUpdate, NewUser, ProfileUpdate, User},
        roles::Role,
        services::{validate_email, validate_password, validate_profile},
    },
    error::{AppError, AppResult},
    images::is_placeholder,
    sheets,
    state::AppState,
};

pub(crate) fn user_not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("User not found with id of {}", id))
}

fn new_user(req: CreateUserRequest) -> AppResult<NewUser> {
    let email = validate_email(req.email)?;
    let password = validate_password(req.password)?;
    let profile = ProfileUpdate {
        name: req.name,
        city: req.city,
        province: req.province,
        address: req.address,
        phone: req.phone,
        birthday: req.birthday,
        avatar: None,
    };
    validate_profile(&profile)?;
    Ok(NewUser {
        email,
        password: PasswordHash::from_plaintext(&password)?,
        role: req.role.unwrap_or(Role::User),
        profile,
    })
}

pub async fn create_user(state: &AppState, req: CreateUserRequest) -> AppResult<User> {
    let user = state.users.create(new_user(req)?).await?;
    info!(user_id = %user.id, role = %user.role, "user created by admin");
    Ok(user)
}

/// Every row is validated before anything is stored; one bad row or
/// duplicate email rejects the whole file.
pub async fn import_users(state: &AppState, rows: Vec<UserImportRow>) -> AppResult<Vec<User>> {
    let batch = sheets::convert_rows(rows, |row| new_user(row.into_request()?))?;
    let users = state.users.create_many(batch).await?;
    info!(count = users.len(), "users imported");
    Ok(users)
}

pub async fn update_user(state: &AppState, id: Uuid, req: UpdateUserRequest) -> AppResult<User> {
    let email = match req.email {
        Some(e) => Some(validate_email(Some(e))?),
        None => None,
    };
    let password = match req.password {
        Some(p) => Some(PasswordHash::from_plaintext(&validate_password(Some(p))?)?),
        None => None,
    };
    let profile = ProfileUpdate {
        name: req.name,
        city: req.city,
        province: req.province,
        address: req.address,
        phone: req.phone,
        birthday: req.birthday,
        avatar: None,
    };
    validate_profile(&profile)?;

    let update = AdminUserUpdate {
        email,
        role: req.role,
        password,
        profile,
    };
    let user = state
        .users
        .admin_update(id, update)
        .await?
        .ok_or_else(|| user_not_found(id))?;
    info!(user_id = %user.id, "user updated by admin");
    Ok(user)
}

pub async fn delete_user(state: &AppState, id: Uuid) -> AppResult<()> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| user_not_found(id))?;
    if !state.users.delete(id).await? {
        return Err(user_not_found(id));
    }
    if !is_placeholder(&user.avatar) {
        if let Err(e) = state.storage.remove(&user.avatar).await {
            warn!(error = %e, key = %user.avatar, "failed to delete avatar");
        }
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}
