use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, State},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{
        ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest, RegisterRequest,
        ResetPasswordRequest, TokenResponse, UpdatePasswordRequest,
    },
    extractors::CurrentUser,
    jwt::JwtKeys,
    repo_types::{ProfileUpdate, User},
    services,
};
use crate::{
    config::AppConfig,
    error::{AppJson, AppResult},
    images::{read_image_field, UPLOAD_BODY_LIMIT},
    response::Envelope,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/forgotpassword", post(forgot_password))
        .route("/auth/resetpassword/:resettoken", put(reset_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/auth/updatedetails", put(update_details))
        .route("/auth/updatepassword", put(update_password))
        .route(
            "/users/:id/avatar",
            put(upload_avatar).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
}

type TokenReply = (CookieJar, Json<TokenResponse>);

fn with_cookie(state: &AppState, jar: CookieJar, token: String, body: TokenResponse) -> TokenReply {
    let cookie = JwtKeys::from_ref(state).session_cookie(token);
    (jar.add(cookie), Json(body))
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<TokenReply> {
    let (user, token) = services::register(&state, payload).await?;
    let body = TokenResponse::with_identity(token.clone(), user.id, user.role);
    Ok(with_cookie(&state, jar, token, body))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<TokenReply> {
    let (user, token) = services::login(&state, payload).await?;
    let body = TokenResponse::with_identity(token.clone(), user.id, user.role);
    Ok(with_cookie(&state, jar, token, body))
}

/// Stateless: the token itself stays valid until it expires.
#[instrument(skip(state, jar))]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    let cookie = JwtKeys::from_ref(&state).cleared_session_cookie();
    (jar.add(cookie), Json(json!({ "success": true, "data": {} })))
}

#[instrument(skip_all, fields(user_id = %user.id()))]
pub async fn get_me(user: CurrentUser) -> Json<Envelope<User>> {
    Json(Envelope::ok(user.0))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id()))]
pub async fn update_details(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(payload): AppJson<ProfileUpdate>,
) -> AppResult<Json<Envelope<User>>> {
    let updated = services::update_details(&state, &user, payload).await?;
    info!("profile updated");
    Ok(Json(Envelope::ok(updated)))
}

#[instrument(skip(state, user, jar, payload), fields(user_id = %user.id()))]
pub async fn update_password(
    State(state): State<AppState>,
    user: CurrentUser,
    jar: CookieJar,
    AppJson(payload): AppJson<UpdatePasswordRequest>,
) -> AppResult<TokenReply> {
    let token =
        services::update_password(&state, &user, payload.current_password, payload.new_password)
            .await?;
    let body = TokenResponse::token_only(token.clone());
    Ok(with_cookie(&state, jar, token, body))
}

/// Base of the emailed reset link. Only the configured origin is trusted.
fn reset_base_url(config: &AppConfig) -> String {
    format!("{}/api/v1/auth/resetpassword", config.public_url)
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> AppResult<Json<ForgotPasswordResponse>> {
    let issued =
        services::forgot_password(&state, payload.email, &reset_base_url(&state.config)).await?;

    let (reset_url, reset_token) = if state.config.expose_reset_token {
        (Some(issued.url), Some(issued.plaintext))
    } else {
        (None, None)
    };
    Ok(Json(ForgotPasswordResponse {
        success: true,
        data: "Email sent",
        reset_url,
        reset_token,
    }))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(resettoken): Path<String>,
    jar: CookieJar,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> AppResult<TokenReply> {
    let token = services::reset_password(&state, &resettoken, payload.password).await?;
    let body = TokenResponse::token_only(token.clone());
    Ok(with_cookie(&state, jar, token, body))
}

/// PUT /users/:id/avatar (multipart, field `file`). Owner or admin.
#[instrument(skip(state, user, mp), fields(user_id = %user.id()))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> AppResult<Json<Envelope<String>>> {
    let upload = read_image_field(&mut mp, state.config.max_file_upload).await?;
    let key = services::upload_avatar(&state, &user, id, upload).await?;
    Ok(Json(Envelope::ok(key)))
}
