use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

/// Error type returned by every handler.
///
/// Each variant carries its own status; handlers never pick a status code
/// separately from the error they build.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    /// A collaborator (mail sender, object storage) failed. The message is safe
    /// to show to clients, the source is only logged.
    #[error("{message}")]
    Dependency {
        message: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

/// Uniform error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Authorization(msg.into())
    }

    /// The one message used for every authentication-gate rejection.
    pub fn not_authenticated() -> Self {
        AppError::Authentication("Not authorized to access this route".into())
    }

    pub fn dependency(msg: impl Into<String>, source: anyhow::Error) -> Self {
        AppError::Dependency {
            message: msg.into(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Dependency { .. } | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Server Error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::not_found("Resource not found"),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::validation("Duplicate field value entered")
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::validation("Referenced resource does not exist")
            }
            _ => AppError::Internal(anyhow::Error::new(err).context("database")),
        }
    }
}

/// `Json` whose rejections (bad syntax, wrong content type, missing fields)
/// come back in the error envelope with status 400.
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(AppJson(value))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Dependency { message, source } => {
                error!(error = %source, %message, "dependency failure");
            }
            AppError::Internal(e) => error!(error = ?e, "internal error"),
            other => warn!(status = %status, error = %other, "request rejected"),
        }

        let body = ErrorBody {
            success: false,
            error: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}
