//! Middleware for observability and rate limiting.
//!
//! This module provides:
//! - Request logging with latency tracking
//! - Sliding-window rate limiting keyed by identifier (user or ip+UA-hash)

pub mod logging;
pub mod rate_limit;

pub use logging::{request_logging, request_logging_simple};
pub use rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitLayer};
