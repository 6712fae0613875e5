use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateUserRequest, UpdateUserRequest, UserImportRow, UserListQuery, UserSheetRow},
    services,
};
use crate::{
    auth::{extractors::AdminUser, repo_types::User},
    error::{AppJson, AppResult},
    response::{Envelope, ListEnvelope},
    sheets::{self, CsvFile, IMPORT_BODY_LIMIT},
    state::AppState,
};

/// Every route here requires the `admin` role.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/export", get(export_users))
        .route("/users/export/:id", get(export_user))
        .route(
            "/users/import",
            post(import_users).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(q): Query<UserListQuery>,
) -> AppResult<Json<ListEnvelope<User>>> {
    let (filter, page) = q.split()?;
    let (users, total) = state.users.list(filter, page).await?;
    Ok(Json(ListEnvelope::new(users, Some(total))))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Envelope<User>>> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| services::user_not_found(id))?;
    Ok(Json(Envelope::ok(user)))
}

#[instrument(skip(state, _admin, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<Envelope<User>>)> {
    let user = services::create_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(user))))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> AppResult<Json<Envelope<User>>> {
    let user = services::update_user(&state, id, payload).await?;
    Ok(Json(Envelope::ok(user)))
}

#[instrument(skip(state, _admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    services::delete_user(&state, id).await?;
    Ok(Json(json!({ "success": true, "data": {} })))
}

#[instrument(skip(state, _admin))]
pub async fn export_users(State(state): State<AppState>, _admin: AdminUser) -> AppResult<CsvFile> {
    let users = state.users.all().await?;
    sheets::export("users.csv", users.into_iter().map(UserSheetRow::from))
}

#[instrument(skip(state, _admin))]
pub async fn export_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<CsvFile> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| services::user_not_found(id))?;
    sheets::export(format!("user_{}.csv", id), [UserSheetRow::from(user)])
}

/// POST /users/import (multipart, field `file`, CSV with a header row)
#[instrument(skip(state, _admin, mp))]
pub async fn import_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    mut mp: Multipart,
) -> AppResult<(StatusCode, Json<ListEnvelope<User>>)> {
    let body = sheets::read_sheet_field(&mut mp).await?;
    let rows: Vec<UserImportRow> = sheets::parse(&body)?;
    let users = services::import_users(&state, rows).await?;
    Ok((StatusCode::CREATED, Json(ListEnvelope::new(users, None))))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::auth::roles::Role;
    use crate::state::testing::{multipart, TestContext};

    async fn call(
        ctx: &TestContext,
        method: Method,
        uri: &str,
        token: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = ctx.app().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn non_admins_are_forbidden() {
        let ctx = TestContext::new();
        let user = ctx.seed_user("u@x.com", "secret1", Role::User).await;
        let (status, body) = call(&ctx, Method::GET, "/api/v1/users", &ctx.token_for(user.id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "User role user is not authorized to access this route");

        let (status, _) = call(&ctx, Method::GET, "/api/v1/users", "garbage", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_crud() {
        let ctx = TestContext::new();
        let admin = ctx.seed_user("boss@x.com", "secret1", Role::Admin).await;
        let token = ctx.token_for(admin.id);

        let (status, body) = call(
            &ctx,
            Method::POST,
            "/api/v1/users",
            &token,
            Some(json!({ "email": "new@x.com", "password": "secret1", "name": "Lin", "city": "Hue" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["role"], "user");
        assert!(body["data"].get("passwordHash").is_none());
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(&ctx, Method::GET, "/api/v1/users?city=hu", &token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["email"], "new@x.com");

        let (status, body) = call(
            &ctx,
            Method::PUT,
            &format!("/api/v1/users/{}", id),
            &token,
            Some(json!({ "phone": "0900" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["phone"], "0900");
        assert_eq!(body["data"]["city"], "Hue");

        let (status, body) = call(&ctx, Method::DELETE, &format!("/api/v1/users/{}", id), &token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "data": {} }));

        let (status, _) = call(&ctx, Method::GET, &format!("/api/v1/users/{}", id), &token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    async fn raw(ctx: &TestContext, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
        let res = ctx.app().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn import_request(token: &str, filename: &str, csv: &str) -> Request<Body> {
        let (content_type, body) = multipart(filename, "text/csv", csv.as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/users/import")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn list_filters_by_birthday() {
        let ctx = TestContext::new();
        let admin = ctx.seed_user("boss@x.com", "secret1", Role::Admin).await;
        let token = ctx.token_for(admin.id);
        for (email, birthday) in [("a@x.com", "1990-04-21T00:00:00Z"), ("b@x.com", "1991-01-01T00:00:00Z")] {
            let (status, _) = call(
                &ctx,
                Method::POST,
                "/api/v1/users",
                &token,
                Some(json!({ "email": email, "password": "secret1", "birthday": birthday })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = call(&ctx, Method::GET, "/api/v1/users?birthday=1990-04-21", &token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["email"], "a@x.com");

        let (status, body) = call(&ctx, Method::GET, "/api/v1/users?birthday=yesterday", &token, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Birthday must be a date like 1990-04-21");
    }

    #[tokio::test]
    async fn export_all_and_one() {
        let ctx = TestContext::new();
        let admin = ctx.seed_user("boss@x.com", "secret1", Role::Admin).await;
        let lin = ctx.seed_user("lin@x.com", "secret1", Role::User).await;
        let token = ctx.token_for(admin.id);

        let req = Request::builder()
            .uri("/api/v1/users/export")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, headers, csv) = raw(&ctx, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"users.csv\""
        );
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "id,name,email,birthday,city,province,address,phone,role,created_at"
        );
        assert_eq!(lines.len(), 3);
        assert!(csv.contains(&format!("{},,lin@x.com,,,,,,user,", lin.id)));
        assert!(!csv.contains("argon2"));

        let req = Request::builder()
            .uri(format!("/api/v1/users/export/{}", lin.id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, headers, csv) = raw(&ctx, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            format!("attachment; filename=\"user_{}.csv\"", lin.id).as_str()
        );
        assert_eq!(csv.lines().count(), 2);

        let (status, body) = call(
            &ctx,
            Method::GET,
            &format!("/api/v1/users/export/{}", Uuid::new_v4()),
            &token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = call(&ctx, Method::GET, "/api/v1/users/export", &ctx.token_for(lin.id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn import_creates_users_from_csv() {
        let ctx = TestContext::new();
        let admin = ctx.seed_user("boss@x.com", "secret1", Role::Admin).await;
        let token = ctx.token_for(admin.id);

        let csv = "name,email,password,role,birthday,city\n\
                   Lin,lin@x.com,secret1,,1990-04-21,Hue\n\
                   Mai,MAI@x.com,secret2,admin,,\n";
        let res = ctx.app().oneshot(import_request(&token, "people.csv", csv)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["count"], 2);
        assert_eq!(body["data"][1]["email"], "mai@x.com");
        assert_eq!(body["data"][1]["role"], "admin");

        let (_, body) = call(&ctx, Method::GET, "/api/v1/users?city=hue", &token, None).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["email"], "lin@x.com");

        let login = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "email": "mai@x.com", "password": "secret2" }).to_string()))
            .unwrap();
        let res = ctx.app().oneshot(login).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn import_rejects_bad_files() {
        let ctx = TestContext::new();
        let admin = ctx.seed_user("boss@x.com", "secret1", Role::Admin).await;
        let token = ctx.token_for(admin.id);

        let csv = "email,password\nok@x.com,secret1\nnot-an-email,secret1\n";
        let (status, _, body) = raw(&ctx, import_request(&token, "people.csv", csv)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["error"], "Row 3: Please add a valid email");
        assert!(ctx.users.snapshot(admin.id).await.is_some());
        let (_, listed) = call(&ctx, Method::GET, "/api/v1/users", &token, None).await;
        assert_eq!(listed["total"], 1);

        let csv = "email,password,role\nok@x.com,secret1,root\n";
        let (status, _, body) = raw(&ctx, import_request(&token, "people.csv", csv)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Row 2: "));

        let (content_type, payload) = multipart("people.png", "image/png", b"png");
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/users/import")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(payload))
            .unwrap();
        let (status, _, body) = raw(&ctx, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Please upload a CSV file"));
    }
}
