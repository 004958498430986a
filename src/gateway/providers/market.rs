//! Market data (quotes) provider.

use crate::gateway::error::GatewayError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub as_of: String,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn quote(&self, ticker: &str) -> Result<Quote, GatewayError>;
}

/// Gated on `FINNHUB_API_KEY`; the wire shape is intentionally generic.
pub struct QuoteProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl QuoteProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://finnhub.io/api/v1".to_string()),
        }
    }
}

#[async_trait]
impl MarketDataProvider for QuoteProvider {
    async fn quote(&self, ticker: &str) -> Result<Quote, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/quote", self.base_url))
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
            return Err(GatewayError::Upstream(format!("market provider returned {}", resp.status())));
        }

        let v: serde_json::Value = resp.json().await.map_err(|e| GatewayError::Upstream(e.to_string()))?;
        let price = v["c"].as_f64().ok_or_else(|| GatewayError::Upstream("missing price field".to_string()))?;
        let change_percent = v["dp"].as_f64().unwrap_or(0.0);
        let volume = v["v"].as_u64().unwrap_or(0);

        Ok(Quote {
            ticker: ticker.to_string(),
            price,
            change_percent,
            volume,
            as_of: chrono::Utc::now().to_rfc3339(),
        })
    }
}

pub struct UnavailableMarketDataProvider;

#[async_trait]
impl MarketDataProvider for UnavailableMarketDataProvider {
    async fn quote(&self, _ticker: &str) -> Result<Quote, GatewayError> {
        Err(GatewayError::Unavailable("FINNHUB_API_KEY not configured".to_string()))
    }
}
