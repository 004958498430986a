//! Gateway-local error type, converted to `AppError` at the call boundary.

use crate::error::AppError;

#[derive(Debug, Clone)]
pub enum GatewayError {
    Unavailable(String),
    RateLimited { retry_after_secs: u64 },
    Upstream(String),
    Timeout,
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Unavailable(m) => write!(f, "provider unavailable: {m}"),
            GatewayError::RateLimited { retry_after_secs } => {
                write!(f, "upstream rate limited, retry after {retry_after_secs}s")
            }
            GatewayError::Upstream(m) => write!(f, "upstream error: {m}"),
            GatewayError::Timeout => write!(f, "upstream timeout"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<&'static str> for GatewayError {
    fn from(s: &'static str) -> Self {
        GatewayError::Upstream(s.to_string())
    }
}

impl GatewayError {
    /// Idempotent reads retry on `Upstream`/`Timeout` only (spec.md §4.1/§7);
    /// `Unavailable` (no credential configured) and rate-limit rejections are
    /// never going to succeed on a second try within the same process.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Upstream(_) | GatewayError::Timeout)
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unavailable(m) => AppError::Unavailable(m),
            GatewayError::RateLimited { retry_after_secs } => AppError::RateLimited { retry_after_secs },
            GatewayError::Upstream(m) => AppError::Upstream(m),
            GatewayError::Timeout => AppError::Timeout,
        }
    }
}
