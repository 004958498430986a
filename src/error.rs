//! Crate-wide error taxonomy
//! Mission: map every internal failure to the documented HTTP contract

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::env;

/// Internal error kind, mapped to HTTP status only at the boundary handler.
#[derive(Debug, Clone)]
pub enum AppError {
    InvalidArgument(String),
    Unauthenticated,
    Forbidden,
    NotFound(String),
    Conflict(String),
    InvalidTransition(String),
    RateLimited { retry_after_secs: u64 },
    Unavailable(String),
    Upstream(String),
    Timeout,
    Canceled,
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::InvalidArgument(m) => write!(f, "invalid argument: {m}"),
            AppError::Unauthenticated => write!(f, "unauthenticated"),
            AppError::Forbidden => write!(f, "forbidden"),
            AppError::NotFound(m) => write!(f, "not found: {m}"),
            AppError::Conflict(m) => write!(f, "conflict: {m}"),
            AppError::InvalidTransition(m) => write!(f, "invalid transition: {m}"),
            AppError::RateLimited { retry_after_secs } => {
                write!(f, "rate limited, retry after {retry_after_secs}s")
            }
            AppError::Unavailable(m) => write!(f, "unavailable: {m}"),
            AppError::Upstream(m) => write!(f, "upstream error: {m}"),
            AppError::Timeout => write!(f, "timeout"),
            AppError::Canceled => write!(f, "canceled"),
            AppError::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn internal(e: impl std::fmt::Display) -> Self {
        AppError::Internal(e.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Canceled => StatusCode::from_u16(499).unwrap(),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-visible message. In production mode `Internal` is generic;
    /// in debug mode it includes the underlying detail (spec §7).
    fn message(&self) -> String {
        match self {
            AppError::Internal(detail) => {
                let debug_mode = env::var("APP_ENV")
                    .map(|v| v.eq_ignore_ascii_case("debug"))
                    .unwrap_or(false);
                if debug_mode {
                    format!("internal error: {detail}")
                } else {
                    "internal server error".to_string()
                }
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        let mut response = (
            status,
            Json(json!({
                "success": false,
                "error": message,
            })),
        )
            .into_response();

        if let AppError::RateLimited { retry_after_secs } = &self {
            response
                .headers_mut()
                .insert("Retry-After", retry_after_secs.to_string().parse().unwrap());
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            AppError::InvalidArgument("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::InvalidTransition("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::RateLimited { retry_after_secs: 5 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Unavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AppError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(AppError::Canceled.status().as_u16(), 499);
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_message_is_generic_outside_debug_mode() {
        std::env::remove_var("APP_ENV");
        let msg = AppError::Internal("db exploded".into()).message();
        assert_eq!(msg, "internal server error");
    }
}
