use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::roles::Role;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: Option<String>,
}

/// Returned whenever a session token is issued. Register and login also carry
/// the caller's role and id.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(rename = "idUser", skip_serializing_if = "Option::is_none")]
    pub id_user: Option<Uuid>,
    pub token: String,
}

impl TokenResponse {
    pub fn with_identity(token: String, id: Uuid, role: Role) -> Self {
        Self {
            success: true,
            role: Some(role),
            id_user: Some(id),
            token,
        }
    }

    pub fn token_only(token: String) -> Self {
        Self {
            success: true,
            role: None,
            id_user: None,
            token,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordResponse {
    pub success: bool,
    pub data: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}
