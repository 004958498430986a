//! Analysis session endpoints: start/get/events/cancel/list/delete (spec.md §6).

use super::envelope::Envelope;
use super::state::AppState;
use crate::auth::middleware::extract_claims;
use crate::error::AppError;
use crate::models::validate_ticker;
use crate::orchestrator::CancelToken;
use crate::progress::{synthesize_replay, ProgressEventKind};
use crate::store::SessionListFilter;
use axum::{
    extract::{Path, Query, Request, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use uuid::Uuid;

fn current_user(req: &Request) -> Result<(Uuid, String), AppError> {
    let claims = extract_claims(req).ok_or(AppError::Unauthenticated)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthenticated)?;
    Ok((user_id, claims.username.clone()))
}

#[derive(Debug, Deserialize)]
pub struct StartAnalysisRequest {
    pub ticker: String,
    pub analysis_date: chrono::NaiveDate,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// POST /analysis/start
pub async fn start_analysis(
    State(state): State<AppState>,
    req: Request,
) -> Result<impl IntoResponse, AppError> {
    let (user_id, username) = current_user(&req)?;
    let body = axum::body::to_bytes(req.into_body(), 1_000_000)
        .await
        .map_err(|e| AppError::InvalidArgument(e.to_string()))?;
    let payload: StartAnalysisRequest =
        serde_json::from_slice(&body).map_err(|e| AppError::InvalidArgument(e.to_string()))?;

    let ticker = validate_ticker(&payload.ticker)
        .ok_or_else(|| AppError::InvalidArgument("invalid ticker".to_string()))?;
    let config_snapshot = payload.config.unwrap_or(serde_json::json!({}));

    let session_id = state.orchestrator.start_session(
        user_id,
        &username,
        &ticker,
        payload.analysis_date,
        config_snapshot,
    )?;

    let cancel = CancelToken::new();
    state.cancel_registry.register(session_id, cancel.clone());

    let orchestrator = state.orchestrator.clone();
    let registry = state.cancel_registry.clone();
    tokio::spawn(async move {
        orchestrator.run(session_id, cancel).await;
        registry.forget(session_id);
    });

    Ok(Envelope::data(serde_json::json!({ "session_id": session_id })))
}

/// GET /analysis/{session_id}
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    req: Request,
) -> Result<impl IntoResponse, AppError> {
    let (user_id, _) = current_user(&req)?;
    let session = state.store.get_session(session_id)?;
    if session.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let sections = state.store.get_sections(session_id)?;
    let executions = state.store.get_executions(session_id)?;

    Ok(Envelope::data(serde_json::json!({
        "session": session,
        "sections": sections,
        "executions": executions,
    })))
}

/// GET /analysis/{session_id}/events
pub async fn analysis_events(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    req: Request,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (user_id, _) = current_user(&req)?;
    let session = state.store.get_session(session_id)?;
    if session.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    let rx = state.progress.subscribe(session_id).ok_or_else(|| AppError::NotFound(format!("session {session_id}")))?;

    // spec.md §4.6: a late subscriber gets a synthetic replay derived from
    // what's already durable, followed by whatever's still live.
    let sections = state.store.get_sections(session_id)?;
    let executions = state.store.get_executions(session_id)?;
    let replay = synthesize_replay(&session, &sections, &executions);

    let replay_stream = stream::iter(replay.into_iter().map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().data(json))
    }));

    let live_stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    return Some((Ok(Event::default().data(json)), rx));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    let event = ProgressEventKind::Lagged;
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    return Some((Ok(Event::default().data(json)), rx));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    let stream = replay_stream.chain(live_stream);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// POST /analysis/{session_id}/cancel
pub async fn cancel_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    req: Request,
) -> Result<impl IntoResponse, AppError> {
    let (user_id, _) = current_user(&req)?;
    let session = state.store.get_session(session_id)?;
    if session.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    if session.status.is_terminal() {
        return Err(AppError::InvalidTransition(format!("session {session_id} is already terminal")));
    }

    if !state.cancel_registry.cancel(session_id) {
        return Err(AppError::NotFound(format!("session {session_id} is not running")));
    }

    state.progress.publish(session_id, ProgressEventKind::PhaseChanged { phase: "cancel_requested".to_string() });

    Ok(Envelope::data(serde_json::json!({ "status": "cancel_requested" })))
}

#[derive(Debug, Deserialize)]
pub struct ListAnalysisQuery {
    pub ticker: Option<String>,
    pub start_date: Option<chrono::NaiveDate>,
    pub end_date: Option<chrono::NaiveDate>,
    pub limit: Option<u32>,
}

/// GET /analysis
pub async fn list_analysis(
    State(state): State<AppState>,
    Query(query): Query<ListAnalysisQuery>,
    req: Request,
) -> Result<impl IntoResponse, AppError> {
    let (user_id, _) = current_user(&req)?;

    let filter = SessionListFilter {
        ticker: query.ticker,
        start_date: query.start_date,
        end_date: query.end_date,
        limit: query.limit.unwrap_or(crate::store::DEFAULT_LIST_LIMIT),
    };

    let sessions = state.store.list_sessions(user_id, &filter)?;
    Ok(Envelope::data(sessions))
}

/// DELETE /analysis/{session_id}
pub async fn delete_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    req: Request,
) -> Result<impl IntoResponse, AppError> {
    let (user_id, _) = current_user(&req)?;
    state.store.delete_session(session_id, user_id)?;
    state.cancel_registry.forget(session_id);
    Ok(Envelope::data(serde_json::json!({ "deleted": true })))
}
