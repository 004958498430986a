//! Headline/news provider.

use crate::gateway::error::GatewayError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub summary: String,
    pub source: String,
    pub published_at: String,
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn headlines(&self, ticker: &str, limit: usize) -> Result<Vec<NewsItem>, GatewayError>;
}

/// Gated on `FINNHUB_API_KEY` (shared with the market data credential, as the
/// underlying vendor serves both), generic JSON-array parsing.
pub struct WireNewsProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl WireNewsProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://finnhub.io/api/v1".to_string()),
        }
    }
}

#[async_trait]
impl NewsProvider for WireNewsProvider {
    async fn headlines(&self, ticker: &str, limit: usize) -> Result<Vec<NewsItem>, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/company-news", self.base_url))
            .query(&[("symbol", ticker), ("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Upstream(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(GatewayError::Upstream(format!("news provider returned {}", resp.status())));
        }

        let v: Vec<serde_json::Value> = resp.json().await.map_err(|e| GatewayError::Upstream(e.to_string()))?;
        let items = v
            .into_iter()
            .take(limit)
            .map(|item| NewsItem {
                headline: item["headline"].as_str().unwrap_or_default().to_string(),
                summary: item["summary"].as_str().unwrap_or_default().to_string(),
                source: item["source"].as_str().unwrap_or_default().to_string(),
                published_at: item["datetime"]
                    .as_i64()
                    .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(items)
    }
}

pub struct UnavailableNewsProvider;

#[async_trait]
impl NewsProvider for UnavailableNewsProvider {
    async fn headlines(&self, _ticker: &str, _limit: usize) -> Result<Vec<NewsItem>, GatewayError> {
        Err(GatewayError::Unavailable("FINNHUB_API_KEY not configured".to_string()))
    }
}
