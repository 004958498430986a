//! Social/news sentiment provider.

use crate::gateway::error::GatewayError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentScore {
    pub ticker: String,
    pub score: f64, // -1.0 (very negative) .. 1.0 (very positive)
    pub buzz: f64,  // relative mention volume, vendor-defined scale
}

#[async_trait]
pub trait SentimentProvider: Send + Sync {
    async fn sentiment(&self, ticker: &str) -> Result<SentimentScore, GatewayError>;
}

/// Gated on `FINNHUB_API_KEY`.
pub struct WireSentimentProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl WireSentimentProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://finnhub.io/api/v1".to_string()),
        }
    }
}

#[async_trait]
impl SentimentProvider for WireSentimentProvider {
    async fn sentiment(&self, ticker: &str) -> Result<SentimentScore, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/news-sentiment", self.base_url))
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
            return Err(GatewayError::Upstream(format!("sentiment provider returned {}", resp.status())));
        }

        let v: serde_json::Value = resp.json().await.map_err(|e| GatewayError::Upstream(e.to_string()))?;
        Ok(SentimentScore {
            ticker: ticker.to_string(),
            score: v["sentiment"]["bullishPercent"].as_f64().unwrap_or(0.5) * 2.0 - 1.0,
            buzz: v["buzz"]["buzz"].as_f64().unwrap_or(0.0),
        })
    }
}

pub struct UnavailableSentimentProvider;

#[async_trait]
impl SentimentProvider for UnavailableSentimentProvider {
    async fn sentiment(&self, _ticker: &str) -> Result<SentimentScore, GatewayError> {
        Err(GatewayError::Unavailable("FINNHUB_API_KEY not configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_provider_always_errors() {
        let provider = UnavailableSentimentProvider;
        let err = provider.sentiment("AAPL").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }
}
