//! Market data passthrough endpoints (spec.md §6): thin wrappers around the
//! Gateway that validate inputs and translate `GatewayError` to `AppError`.

use super::envelope::Envelope;
use super::state::AppState;
use crate::error::AppError;
use crate::models::validate_ticker;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

/// GET /market/quote/{ticker}
pub async fn get_quote(State(state): State<AppState>, Path(ticker): Path<String>) -> Result<impl IntoResponse, AppError> {
    let ticker = validate_ticker(&ticker).ok_or_else(|| AppError::InvalidArgument("invalid ticker".to_string()))?;
    let quote = state.gateway.quote(&ticker).await?;
    Ok(Envelope::data(quote))
}

#[derive(Debug, Deserialize)]
pub struct QuotesQuery {
    pub tickers: String,
}

const MAX_BATCH_TICKERS: usize = 50;

/// GET /market/quotes?tickers=AAPL,MSFT,...
pub async fn get_quotes(
    State(state): State<AppState>,
    Query(query): Query<QuotesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let tickers = query
        .tickers
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| validate_ticker(t).ok_or_else(|| AppError::InvalidArgument(format!("invalid ticker: {t}"))))
        .collect::<Result<Vec<_>, _>>()?;

    if tickers.is_empty() || tickers.len() > MAX_BATCH_TICKERS {
        return Err(AppError::InvalidArgument(format!("tickers must be 1..={MAX_BATCH_TICKERS}")));
    }

    let results = state.gateway.quotes(&tickers).await;
    let quotes: Vec<_> = results
        .into_iter()
        .map(|(ticker, result)| match result {
            Ok(quote) => serde_json::json!({ "ticker": ticker, "quote": quote }),
            Err(e) => serde_json::json!({ "ticker": ticker, "error": e.to_string() }),
        })
        .collect();

    Ok(Envelope::data(quotes))
}

#[derive(Debug, Deserialize)]
pub struct FearGreedHistoryQuery {
    pub days: u32,
    #[serde(default = "default_aggregation")]
    pub aggregation: String,
}

fn default_aggregation() -> String {
    "daily".to_string()
}

/// GET /market/fear-greed/history?days=...&aggregation=daily|monthly
pub async fn fear_greed_history(
    State(state): State<AppState>,
    Query(query): Query<FearGreedHistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !(1..=2000).contains(&query.days) {
        return Err(AppError::InvalidArgument("days must be in [1, 2000]".to_string()));
    }
    if query.aggregation != "daily" && query.aggregation != "monthly" {
        return Err(AppError::InvalidArgument("aggregation must be 'daily' or 'monthly'".to_string()));
    }

    let points = state.gateway.fear_greed_history(query.days, &query.aggregation).await?;
    Ok(Envelope::data(points))
}

/// GET /market/sentiment?ticker=...
#[derive(Debug, Deserialize)]
pub struct SentimentQuery {
    pub ticker: String,
}

pub async fn sentiment(
    State(state): State<AppState>,
    Query(query): Query<SentimentQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ticker = validate_ticker(&query.ticker).ok_or_else(|| AppError::InvalidArgument("invalid ticker".to_string()))?;
    let score = state.gateway.sentiment(&ticker).await?;
    Ok(Envelope::data(score))
}
