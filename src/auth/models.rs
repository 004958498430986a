//! Authentication Models
//! Mission: request/response shapes for the login flow

use crate::models::User;
use serde::{Deserialize, Serialize};

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject (user_id)
    pub username: String,
    pub is_admin: bool,
    pub exp: usize, // expiration timestamp
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response (spec.md §6: `{access_token, refresh_token, token_type, expires_in}`)
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: usize, // seconds until the access token expires
    pub user: UserResponse,
}

/// User response (sanitized)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub is_admin: bool,
    pub created_at: String,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            is_admin: user.is_admin,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn user_response_hides_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            username: "trader1".to_string(),
            password_hash: "$2b$...".to_string(),
            is_active: true,
            is_admin: false,
            email: None,
            created_at: Utc::now(),
        };

        let response = UserResponse::from_user(&user);
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("2b$"));
        assert!(json.contains("trader1"));
    }
}
