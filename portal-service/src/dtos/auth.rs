use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Role, User};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Please provide email and password"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Please provide email and password"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Please provide current and new password"))]
    pub current_password: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Please provide current and new password"))]
    pub new_password: String,
}

/// Public view of a user; hashes never leave the service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[serde(rename = "_id")]
    pub record_id: String,
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            record_id: user.id.to_hex(),
            id: user.id.to_hex(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            phone: user.phone.clone(),
            is_active: user.is_active,
            last_login: super::to_chrono(user.last_login),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_collapse_to_one_message() {
        let req: LoginRequest = serde_json::from_str("{}").unwrap();
        let err = req.validate().unwrap_err();
        assert_eq!(
            service_core::error::flatten_validation_errors(&err),
            "Please provide email and password"
        );
    }

    #[test]
    fn user_response_hides_secrets() {
        let mut user = User::new(
            "ops@littleride.et",
            "$argon2id$secret".to_string(),
            "Ops".to_string(),
            Role::Operations,
            None,
        );
        user.refresh_token_hash = Some("deadbeef".to_string());

        let json = serde_json::to_string(&UserResponse::from(&user)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("deadbeef"));
        assert!(json.contains("\"isActive\":true"));
        assert!(json.contains("\"role\":\"operations\""));
        assert!(json.contains(&format!("\"_id\":\"{}\"", user.id.to_hex())));
    }
}
