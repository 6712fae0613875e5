use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;
use uuid::Uuid;

use super::{
    jwt::{JwtKeys, TOKEN_COOKIE},
    repo_types::User,
    roles::Role,
};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

/// Identity resolved from a session token. Handlers that take this extractor
/// are protected; handlers that don't are public.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    /// Role check. Runs on an already authenticated identity only, so it can
    /// never be reached for an anonymous request.
    pub fn authorize(&self, allowed: &[Role]) -> AppResult<()> {
        if allowed.contains(&self.role()) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "User role {} is not authorized to access this route",
                self.role()
            )))
        }
    }
}

/// Ownership refinement: the resource's owner or an admin may proceed.
pub fn ensure_owner_or_admin(owner_id: Uuid, user: &CurrentUser) -> AppResult<()> {
    if owner_id == user.id() || user.role() == Role::Admin {
        Ok(())
    } else {
        Err(AppError::forbidden(
            "Not authorized to modify this resource",
        ))
    }
}

/// `Authorization: Bearer <token>` wins over the `token` cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        CookieJar::from_headers(headers)
            .get(TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
    })
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or_else(|| {
            debug!("no session credential");
            AppError::not_authenticated()
        })?;

        let claims = JwtKeys::from_ref(state).verify(&token).map_err(|e| {
            debug!(error = %e, "session token rejected");
            AppError::not_authenticated()
        })?;

        let user = state.users.find_by_id(claims.sub).await?.ok_or_else(|| {
            debug!(user_id = %claims.sub, "token subject no longer exists");
            AppError::not_authenticated()
        })?;

        Ok(CurrentUser(user))
    }
}

/// `CurrentUser` that has passed `authorize(&[Role::Admin])`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        user.authorize(&[Role::Admin])?;
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::state::testing::TestContext;

    async fn whoami(CurrentUser(user): CurrentUser) -> String {
        user.email
    }

    async fn admin_only(AdminUser(user): AdminUser) -> String {
        user.0.email
    }

    fn router(ctx: &TestContext) -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .route("/admin", get(admin_only))
            .with_state(ctx.state.clone())
    }

    async fn call(app: Router, uri: &str, headers: &[(header::HeaderName, String)]) -> (StatusCode, String) {
        let mut req = Request::builder().uri(uri);
        for (k, v) in headers {
            req = req.header(k, v);
        }
        let res = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn user_with_role(role: Role) -> CurrentUser {
        CurrentUser(User {
            id: Uuid::new_v4(),
            name: String::new(),
            email: "a@x.com".into(),
            birthday: None,
            city: String::new(),
            province: String::new(),
            address: String::new(),
            phone: String::new(),
            avatar: String::new(),
            role,
            password_hash: String::new(),
            reset_password_token: None,
            reset_password_expire: None,
            created_at: time::OffsetDateTime::now_utc(),
        })
    }

    #[tokio::test]
    async fn bearer_header_resolves_identity() {
        let ctx = TestContext::new();
        let user = ctx.seed_user("a@x.com", "secret1", Role::User).await;
        let token = ctx.token_for(user.id);
        let (status, body) = call(
            router(&ctx),
            "/whoami",
            &[(header::AUTHORIZATION, format!("Bearer {}", token))],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "a@x.com");
    }

    #[tokio::test]
    async fn cookie_resolves_identity() {
        let ctx = TestContext::new();
        let user = ctx.seed_user("c@x.com", "secret1", Role::User).await;
        let token = ctx.token_for(user.id);
        let (status, body) = call(
            router(&ctx),
            "/whoami",
            &[(header::COOKIE, format!("token={}", token))],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "c@x.com");
    }

    #[tokio::test]
    async fn rejections_are_indistinguishable() {
        let ctx = TestContext::new();
        let ghost_token = ctx.token_for(Uuid::new_v4());

        let cases: Vec<Vec<(header::HeaderName, String)>> = vec![
            vec![],
            vec![(header::AUTHORIZATION, "Bearer garbage".into())],
            vec![(header::AUTHORIZATION, format!("Bearer {}", ghost_token))],
            vec![(header::COOKIE, "token=none".into())],
        ];

        let mut bodies = Vec::new();
        for headers in cases {
            let (status, body) = call(router(&ctx), "/whoami", &headers).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            bodies.push(body);
        }
        assert!(bodies.windows(2).all(|w| w[0] == w[1]));
        assert!(bodies[0].contains("Not authorized to access this route"));
    }

    #[tokio::test]
    async fn admin_extractor_checks_role() {
        let ctx = TestContext::new();
        let user = ctx.seed_user("u@x.com", "secret1", Role::User).await;
        let admin = ctx.seed_user("boss@x.com", "secret1", Role::Admin).await;

        let (status, body) = call(
            router(&ctx),
            "/admin",
            &[(header::AUTHORIZATION, format!("Bearer {}", ctx.token_for(user.id)))],
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("User role user is not authorized"));

        let (status, _) = call(
            router(&ctx),
            "/admin",
            &[(header::AUTHORIZATION, format!("Bearer {}", ctx.token_for(admin.id)))],
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(router(&ctx), "/admin", &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn authorize_checks_membership() {
        let user = user_with_role(Role::User);
        assert!(user.authorize(&[Role::User, Role::Admin]).is_ok());
        assert!(user.authorize(&[Role::Admin]).is_err());
        assert!(user.authorize(&[]).is_err());
    }

    #[test]
    fn owner_or_admin() {
        let author = user_with_role(Role::User);
        let stranger = user_with_role(Role::User);
        let admin = user_with_role(Role::Admin);

        assert!(ensure_owner_or_admin(author.id(), &author).is_ok());
        assert!(ensure_owner_or_admin(author.id(), &admin).is_ok());
        let err = ensure_owner_or_admin(author.id(), &stranger).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        headers.insert(header::COOKIE, "token=from-cookie".parse().unwrap());
        assert_eq!(session_token(&headers).as_deref(), Some("from-header"));

        headers.remove(AUTHORIZATION);
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(session_token(&headers).as_deref(), Some("from-cookie"));
    }
}
