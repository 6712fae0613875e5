use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, RegisterRequest},
    extractors::{ensure_owner_or_admin, CurrentUser},
    jwt::JwtKeys,
    password::{verify_password, PasswordHash},
    repo_types::{NewUser, ProfileUpdate, User},
    reset::{hash_reset_token, ResetToken},
    roles::Role,
};
use crate::{
    error::{AppError, AppResult},
    images::{self, ImageUpload},
    mail::OutboundEmail,
    state::AppState,
};

pub const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_NAME_LEN: usize = 50;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^<>()\[\]\\.,;:\s@]+(\.[^<>()\[\]\\.,;:\s@]+)*@([a-zA-Z0-9\-]+\.)+[a-zA-Z]{2,}$")
                .unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn validate_email(raw: Option<String>) -> AppResult<String> {
    let email = normalize_email(raw.as_deref().unwrap_or_default());
    if email.is_empty() {
        return Err(AppError::validation("Please provide an email"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::validation("Please add a valid email"));
    }
    Ok(email)
}

pub(crate) fn validate_password(raw: Option<String>) -> AppResult<String> {
    let password = raw.unwrap_or_default();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::validation("Password is too long"));
    }
    Ok(password)
}

pub(crate) fn validate_profile(p: &ProfileUpdate) -> AppResult<()> {
    if p.name.as_ref().is_some_and(|n| n.chars().count() > MAX_NAME_LEN) {
        return Err(AppError::validation(format!(
            "Name can not be more than {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn hash(plain: &str) -> AppResult<PasswordHash> {
    Ok(PasswordHash::from_plaintext(plain)?)
}

fn issue(state: &AppState, user_id: Uuid) -> AppResult<String> {
    Ok(JwtKeys::from_ref(state).sign(user_id)?)
}

pub async fn register(state: &AppState, req: RegisterRequest) -> AppResult<(User, String)> {
    let email = validate_email(req.email)?;
    let password = validate_password(req.password)?;
    let profile = ProfileUpdate {
        name: req.name.map(|n| n.trim().to_string()),
        ..ProfileUpdate::default()
    };
    validate_profile(&profile)?;

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::validation("Duplicate field value entered"));
    }

    let user = state
        .users
        .create(NewUser {
            email,
            password: hash(&password)?,
            role: Role::User,
            profile,
        })
        .await?;
    let token = issue(state, user.id)?;

    info!(user_id = %user.id, "user registered");
    Ok((user, token))
}

/// Unknown email and wrong password produce the same error.
pub async fn login(state: &AppState, req: LoginRequest) -> AppResult<(User, String)> {
    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Err(AppError::validation("Please provide an email and password"));
    };
    let email = normalize_email(&email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::validation("Please provide an email and password"));
    }

    let invalid = || AppError::Authentication("Invalid credentials".into());

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!("login for unknown email");
        return Err(invalid());
    };
    if !verify_password(&password, &user.password_hash) {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(invalid());
    }

    let token = issue(state, user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user, token))
}

pub struct IssuedReset {
    pub plaintext: String,
    pub url: String,
}

impl std::fmt::Debug for IssuedReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedReset")
            .field("plaintext", &"<redacted>")
            .field("url", &"<redacted>")
            .finish()
    }
}

fn reset_email(to: &str, url: &str) -> OutboundEmail {
    OutboundEmail {
        to: to.to_string(),
        subject: "Password reset token".into(),
        body: format!(
            "You are receiving this email because you (or someone else) has requested \
             the reset of a password. Please make a PUT request to:\n\n{}",
            url
        ),
    }
}

/// Stores a new reset hash for the account and mails the plaintext. If the
/// mail cannot be sent the stored hash is cleared again before the error is
/// returned.
pub async fn forgot_password(
    state: &AppState,
    email: Option<String>,
    reset_base_url: &str,
) -> AppResult<IssuedReset> {
    let email = validate_email(email)?;
    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("There is no user with that email"))?;

    let token = ResetToken::generate();
    state
        .users
        .set_reset_token(user.id, Some((token.hash.clone(), token.expires_at)))
        .await?;

    let url = format!("{}/{}", reset_base_url.trim_end_matches('/'), token.plaintext);
    if let Err(e) = state.mailer.send(reset_email(&user.email, &url)).await {
        state.users.set_reset_token(user.id, None).await?;
        return Err(AppError::dependency("Email could not be sent", e));
    }

    info!(user_id = %user.id, "password reset token issued");
    Ok(IssuedReset {
        plaintext: token.plaintext,
        url,
    })
}

pub async fn reset_password(
    state: &AppState,
    plaintext: &str,
    password: Option<String>,
) -> AppResult<String> {
    let digest = hash_reset_token(plaintext);
    let user = state
        .users
        .find_by_reset_token(&digest, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| AppError::validation("Invalid token"))?;

    let password = validate_password(password)?;
    // clears the reset hash and expiry in the same write
    if !state.users.set_password(user.id, hash(&password)?).await? {
        return Err(AppError::validation("Invalid token"));
    }

    info!(user_id = %user.id, "password reset");
    issue(state, user.id)
}

pub async fn update_password(
    state: &AppState,
    current: &CurrentUser,
    current_password: Option<String>,
    new_password: Option<String>,
) -> AppResult<String> {
    let current_password = current_password.unwrap_or_default();
    if !verify_password(&current_password, &current.0.password_hash) {
        warn!(user_id = %current.id(), "update password with wrong current password");
        return Err(AppError::Authentication("Password is incorrect".into()));
    }
    let new_password = validate_password(new_password)?;

    if !state.users.set_password(current.id(), hash(&new_password)?).await? {
        return Err(AppError::not_authenticated());
    }
    info!(user_id = %current.id(), "password updated");
    issue(state, current.id())
}

pub async fn update_details(
    state: &AppState,
    current: &CurrentUser,
    mut update: ProfileUpdate,
) -> AppResult<User> {
    validate_profile(&update)?;
    update.avatar = None;
    state
        .users
        .update_profile(current.id(), update)
        .await?
        .ok_or_else(AppError::not_authenticated)
}

/// Replaces the avatar of `target_id`. Only the account owner or an admin may.
pub async fn upload_avatar(
    state: &AppState,
    current: &CurrentUser,
    target_id: Uuid,
    upload: ImageUpload,
) -> AppResult<String> {
    let target = state
        .users
        .find_by_id(target_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("User not found with id of {}", target_id)))?;
    ensure_owner_or_admin(target.id, current)?;

    let key = images::replace_photo(
        state.storage.as_ref(),
        "avatars",
        target.id,
        &target.avatar,
        upload,
    )
    .await?;

    state
        .users
        .update_profile(
            target.id,
            ProfileUpdate {
                avatar: Some(key.clone()),
                ..ProfileUpdate::default()
            },
        )
        .await?;
    info!(user_id = %target.id, key = %key, "avatar updated");
    Ok(key)
}
