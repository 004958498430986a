//! Authentication API Endpoints
//! Mission: login, logout, and "who am I" for the HTTP surface

use crate::auth::{
    jwt::JwtHandler,
    middleware::extract_claims,
    models::{LoginRequest, LoginResponse, UserResponse},
    user_store::UserStore,
};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use tracing::{info, warn};

const SESSION_COOKIE: &str = "analyst_desk_session";

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub jwt_handler: Arc<JwtHandler>,
}

impl AuthState {
    pub fn new(user_store: Arc<UserStore>, jwt_handler: Arc<JwtHandler>) -> Self {
        Self {
            user_store,
            jwt_handler,
        }
    }
}

const REFRESH_COOKIE: &str = "analyst_desk_refresh";

/// POST /api/v1/auth/login
/// Body is form-encoded (`username`, `password`) per the documented contract.
/// On success, sets HTTP-only access/refresh cookies in addition to returning
/// both tokens in the body (so both bearer-token and cookie-based clients
/// work).
pub async fn login(
    State(state): State<AuthState>,
    jar: CookieJar,
    Form(payload): Form<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AuthApiError> {
    info!(username = %payload.username, "login attempt");

    let valid = state
        .user_store
        .verify_password(&payload.username, &payload.password)
        .map_err(|_| AuthApiError::InternalError)?;

    if !valid {
        warn!(username = %payload.username, "failed login attempt");
        return Err(AuthApiError::InvalidCredentials);
    }

    let user = state
        .user_store
        .get_user_by_username(&payload.username)
        .map_err(|_| AuthApiError::InternalError)?
        .ok_or(AuthApiError::InvalidCredentials)?;

    let (access_token, expires_in) = state
        .jwt_handler
        .generate_token(&user)
        .map_err(|_| AuthApiError::InternalError)?;
    let refresh_token = state
        .jwt_handler
        .generate_refresh_token(&user)
        .map_err(|_| AuthApiError::InternalError)?;

    info!(username = %user.username, is_admin = user.is_admin, "login successful");

    let access_cookie = Cookie::build((SESSION_COOKIE, access_token.clone()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    let refresh_cookie = Cookie::build((REFRESH_COOKIE, refresh_token.clone()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();

    let jar = jar.add(access_cookie).add(refresh_cookie);

    Ok((
        jar,
        Json(LoginResponse {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in,
            user: UserResponse::from_user(&user),
        }),
    ))
}

/// POST /api/v1/auth/logout
/// Clears the session cookie. Stateless JWTs aren't revoked server-side;
/// the client is expected to discard the bearer token too.
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    let jar = jar.remove(Cookie::from(SESSION_COOKIE)).remove(Cookie::from(REFRESH_COOKIE));
    (jar, Json(serde_json::json!({ "message": "logged out" })))
}

/// GET /api/v1/auth/me
/// Reflects the authenticated principal back from JWT claims — no DB lookup.
pub async fn get_current_user(req: Request) -> Result<Json<UserResponse>, AuthApiError> {
    let claims = extract_claims(&req).ok_or(AuthApiError::Unauthorized)?;

    Ok(Json(UserResponse {
        id: claims.sub.clone(),
        username: claims.username.clone(),
        is_admin: claims.is_admin,
        created_at: String::new(),
    }))
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    InvalidCredentials,
    Unauthorized,
    InternalError,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid username or password")
            }
            AuthApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "authentication required"),
            AuthApiError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };

        (
            status,
            Json(serde_json::json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_user_response_from_user() {
        let user = User {
            id: Uuid::new_v4(),
            username: "testuser".to_string(),
            password_hash: "hash123".to_string(),
            is_active: true,
            is_admin: false,
            email: None,
            created_at: Utc::now(),
        };

        let response = UserResponse::from_user(&user);
        assert_eq!(response.username, "testuser");
        assert!(!response.is_admin);
    }

    #[test]
    fn test_auth_api_error_responses() {
        let invalid_creds = AuthApiError::InvalidCredentials.into_response();
        assert_eq!(invalid_creds.status(), StatusCode::UNAUTHORIZED);

        let unauthorized = AuthApiError::Unauthorized.into_response();
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
    }
}
