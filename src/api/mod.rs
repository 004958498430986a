//! HTTP surface (C8)
//! Mission: thin request/response layer — each handler validates input,
//! invokes one orchestrator/store/gateway operation, and returns the
//! `{success, message?, data?, error?}` envelope (spec.md §4.8).

pub mod analysis;
pub mod envelope;
pub mod health;
pub mod market;
pub mod state;

pub use state::AppState;

use crate::auth::{api as auth_api, middleware::auth_middleware, AuthState};
use crate::middleware::logging::request_logging;
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimitLayer};
use axum::{
    middleware as axum_mw,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

const LOGIN_PATH: &str = "/api/v1/auth/login";
const START_ANALYSIS_PATH: &str = "/api/v1/analysis/start";

/// Assembles the full router: a public health check, the auth endpoints
/// (rate-limited, no JWT required), and the JWT-protected analysis/market
/// surface. Layers are applied bottom-to-top, so the last `.route_layer()`
/// added runs first.
pub fn build_router(state: AppState, auth_state: AuthState, config: &crate::config::Config) -> Router {
    let rate_limiter = RateLimitLayer::new(RateLimitConfig::new(
        config.rate_limit_global_max,
        config.rate_limit_global_window_secs,
    ))
    .with_endpoint(
        LOGIN_PATH,
        RateLimitConfig::new(config.rate_limit_login_max, config.rate_limit_login_window_secs),
    )
    .with_endpoint(
        START_ANALYSIS_PATH,
        RateLimitConfig::new(
            config.rate_limit_start_analysis_max,
            config.rate_limit_start_analysis_window_secs,
        ),
    );

    let jwt_handler = auth_state.jwt_handler.clone();

    let auth_router = Router::new()
        .route("/api/v1/auth/login", post(auth_api::login))
        .route("/api/v1/auth/logout", post(auth_api::logout))
        .with_state(auth_state)
        .route_layer(axum_mw::from_fn_with_state(rate_limiter.clone(), rate_limit_middleware));

    let protected_routes = Router::new()
        .route("/api/v1/auth/me", get(auth_api::get_current_user))
        .route("/api/v1/analysis/start", post(analysis::start_analysis))
        .route("/api/v1/analysis", get(analysis::list_analysis))
        .route("/api/v1/analysis/:session_id", get(analysis::get_analysis))
        .route("/api/v1/analysis/:session_id", delete(analysis::delete_analysis))
        .route("/api/v1/analysis/:session_id/events", get(analysis::analysis_events))
        .route("/api/v1/analysis/:session_id/cancel", post(analysis::cancel_analysis))
        .route("/api/v1/market/quote/:ticker", get(market::get_quote))
        .route("/api/v1/market/quotes", get(market::get_quotes))
        .route("/api/v1/market/fear-greed/history", get(market::fear_greed_history))
        .route("/api/v1/market/sentiment", get(market::sentiment))
        .with_state(state.clone())
        // Rate limit runs first (inner), auth runs second (outer) — auth
        // must populate `Claims` in request extensions before the rate
        // limiter reads them for per-user identification.
        .route_layer(axum_mw::from_fn_with_state(rate_limiter.clone(), rate_limit_middleware))
        .route_layer(axum_mw::from_fn_with_state(jwt_handler, auth_middleware));

    let public_routes = Router::new().route("/health", get(health::health_check)).with_state(state);

    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = config.allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(auth_router)
        .layer(cors)
        .layer(axum::middleware::from_fn(request_logging))
}
