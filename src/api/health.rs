//! GET /health — liveness probe with a DB round-trip (spec.md §6).

use super::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::time::Instant;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let db_ok = state.store.ping().is_ok();
    let response_time_ms = start.elapsed().as_millis();

    let status = if db_ok { "ok" } else { "degraded" };
    let body = Json(serde_json::json!({
        "status": status,
        "db": {
            "connection": if db_ok { "ok" } else { "error" },
            "response_time_ms": response_time_ms,
        },
        "version": env!("CARGO_PKG_VERSION"),
    }));

    if db_ok {
        (StatusCode::OK, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body)
    }
}
