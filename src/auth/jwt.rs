//! JWT Token Handler
//! Mission: Generate and validate JWT tokens securely

use crate::auth::models::Claims;
use crate::models::User;
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// JWT Handler for token operations
pub struct JwtHandler {
    secret: String,
    expiration_hours: i64,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            expiration_hours: 24,
        }
    }

    pub fn with_expiration_hours(secret: String, expiration_hours: i64) -> Self {
        Self {
            secret,
            expiration_hours,
        }
    }

    /// Generate a JWT token for a user
    pub fn generate_token(&self, user: &User) -> Result<(String, usize)> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(chrono::Duration::hours(self.expiration_hours))
            .context("invalid timestamp")?
            .timestamp() as usize;

        let expires_in = (self.expiration_hours * 3600) as usize;

        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            is_admin: user.is_admin,
            exp: expiration,
        };

        debug!(
            username = %user.username,
            user_id = %user.id,
            hours = self.expiration_hours,
            "generating jwt"
        );

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("failed to generate jwt")?;

        Ok((token, expires_in))
    }

    /// Generate a long-lived refresh token for a user. Same claims shape as
    /// the access token, just a longer expiration (10x); there is no
    /// separate refresh endpoint, so this token is only ever re-validated
    /// the same way an access token is.
    pub fn generate_refresh_token(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(chrono::Duration::hours(self.expiration_hours * 10))
            .context("invalid timestamp")?
            .timestamp() as usize;

        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            is_admin: user.is_admin,
            exp: expiration,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("failed to generate refresh jwt")
    }

    /// Validate a JWT token and extract claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .context("invalid or expired token")?;

        debug!(username = %decoded.claims.username, "validated jwt");

        Ok(decoded.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn create_test_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "testuser".to_string(),
            password_hash: "hash".to_string(),
            is_active: true,
            is_admin: false,
            email: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_jwt_generation_and_validation() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string());
        let user = create_test_user();

        let (token, expires_in) = handler.generate_token(&user).unwrap();
        assert!(!token.is_empty());
        assert_eq!(expires_in, 24 * 3600);

        let claims = handler.validate_token(&token).unwrap();
        assert_eq!(claims.username, user.username);
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.is_admin, user.is_admin);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string());
        let result = handler.validate_token("invalid.token.here");
        assert!(result.is_err());
    }

    #[test]
    fn test_different_secrets_reject() {
        let handler1 = JwtHandler::new("secret1".to_string());
        let handler2 = JwtHandler::new("secret2".to_string());
        let user = create_test_user();

        let (token, _) = handler1.generate_token(&user).unwrap();

        let result = handler2.validate_token(&token);
        assert!(result.is_err());
    }

    #[test]
    fn test_token_contains_all_claims() {
        let handler = JwtHandler::new("test-secret-key-12345".to_string());
        let mut user = create_test_user();
        user.username = "admin".to_string();
        user.is_admin = true;

        let (token, _) = handler.generate_token(&user).unwrap();
        let claims = handler.validate_token(&token).unwrap();

        assert_eq!(claims.username, "admin");
        assert!(claims.is_admin);
        assert!(claims.exp > Utc::now().timestamp() as usize);
    }
}
