//! Rate limiting middleware.
//!
//! Sliding-window limiter keyed by request identifier (authenticated user id,
//! else `ip + short-hash(User-Agent)`), with a global limit plus per-endpoint
//! overrides — mirrors the global/endpoint split of a Python rate-limit
//! middleware this crate's behavior is grounded on.

use crate::auth::models::Claims;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// One sliding window's worth of request timestamps for a single identifier.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

struct Window {
    /// Timestamps of requests still inside the current window, oldest first.
    hits: Vec<Instant>,
}

/// A single sliding-window limiter, reusable for the global limit or any one
/// endpoint override.
#[derive(Clone)]
struct SlidingWindowLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<String, Window>>>,
}

impl SlidingWindowLimiter {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns `Ok(remaining)` if allowed, `Err(retry_after)` if the
    /// identifier has exhausted its window.
    fn check(&self, identifier: &str) -> Result<u32, Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.config.window;

        let entry = state
            .entry(identifier.to_string())
            .or_insert_with(|| Window { hits: Vec::new() });

        entry.hits.retain(|t| now.duration_since(*t) < window);

        if entry.hits.len() as u32 >= self.config.max_requests {
            let oldest = entry.hits[0];
            let retry_after = window.saturating_sub(now.duration_since(oldest));
            return Err(retry_after);
        }

        entry.hits.push(now);
        Ok(self.config.max_requests - entry.hits.len() as u32)
    }

    fn cleanup(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let window = self.config.window;
        state.retain(|_, entry| entry.hits.iter().any(|t| now.duration_since(*t) < window));
    }
}

/// Combined global + per-endpoint rate limiter, installed once as router state.
#[derive(Clone)]
pub struct RateLimitLayer {
    global: SlidingWindowLimiter,
    per_endpoint: Arc<HashMap<&'static str, SlidingWindowLimiter>>,
}

impl RateLimitLayer {
    pub fn new(global: RateLimitConfig) -> Self {
        Self {
            global: SlidingWindowLimiter::new(global),
            per_endpoint: Arc::new(HashMap::new()),
        }
    }

    pub fn with_endpoint(mut self, path: &'static str, config: RateLimitConfig) -> Self {
        Arc::make_mut(&mut self.per_endpoint).insert(path, SlidingWindowLimiter::new(config));
        self
    }

    fn check(&self, identifier: &str, path: &str) -> Result<u32, Duration> {
        if let Some(limiter) = self.per_endpoint.get(path) {
            limiter.check(identifier)?;
        }
        self.global.check(identifier)
    }

    /// Periodic cleanup of stale identifiers; call from a background task.
    pub fn cleanup(&self) {
        self.global.cleanup();
        for limiter in self.per_endpoint.values() {
            limiter.cleanup();
        }
    }
}

/// `ip + short-hash(User-Agent)` fallback identifier for unauthenticated requests.
fn anonymous_identifier(addr: IpAddr, user_agent: Option<&str>) -> String {
    let mut hasher = DefaultHasher::new();
    user_agent.unwrap_or("").hash(&mut hasher);
    format!("{addr}:{:x}", hasher.finish())
}

fn identifier_for(req: &Request<Body>, addr: IpAddr) -> String {
    if let Some(claims) = req.extensions().get::<Claims>() {
        return format!("user:{}", claims.sub);
    }

    let user_agent = req
        .headers()
        .get("User-Agent")
        .and_then(|v| v.to_str().ok());
    anonymous_identifier(addr, user_agent)
}

/// Rate limiting middleware function. Must run after the auth middleware so
/// that `Claims`, when present, are already in request extensions.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<RateLimitLayer>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let identifier = identifier_for(&request, addr.ip());

    match limiter.check(&identifier, &path) {
        Ok(_remaining) => next.run(request).await,
        Err(retry_after) => {
            warn!(
                identifier = %identifier,
                path = %path,
                retry_after_secs = retry_after.as_secs(),
                "rate limit exceeded"
            );

            let body = serde_json::json!({
                "success": false,
                "error": "rate limit exceeded, retry later",
            });

            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.as_secs().max(1).to_string())],
                axum::Json(body),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_under_limit() {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig::new(5, 60));
        for _ in 0..5 {
            assert!(limiter.check("a").is_ok());
        }
    }

    #[test]
    fn test_exceeding_limit_is_rejected() {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig::new(3, 60));
        for _ in 0..3 {
            assert!(limiter.check("a").is_ok());
        }
        assert!(limiter.check("a").is_err());
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig::new(1, 60));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        assert!(limiter.check("a").is_err());
    }

    #[test]
    fn test_endpoint_override_applies_before_global() {
        let layer = RateLimitLayer::new(RateLimitConfig::new(100, 60))
            .with_endpoint("/api/v1/auth/login", RateLimitConfig::new(1, 300));

        assert!(layer.check("ip:1", "/api/v1/auth/login").is_ok());
        assert!(layer.check("ip:1", "/api/v1/auth/login").is_err());
        // A different, non-overridden path for the same identifier is unaffected.
        assert!(layer.check("ip:1", "/api/v1/market/quote/AAPL").is_ok());
    }

    #[test]
    fn test_anonymous_identifier_is_stable_for_same_ua() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let a = anonymous_identifier(ip, Some("curl/8.0"));
        let b = anonymous_identifier(ip, Some("curl/8.0"));
        let c = anonymous_identifier(ip, Some("other-agent"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
