//! External-Service Gateway (C1)
//! Mission: the only component allowed to speak to the outside world —
//! caching, rate limiting, retry, and credential-gated availability for
//! every upstream the orchestrator needs.

pub mod cache;
pub mod error;
pub mod providers;
pub mod rate_limit;
pub mod retry;

use crate::config::Config;
use cache::TtlCache;
use error::GatewayError;
use chrono::NaiveDate;
use providers::fred::{
    aggregate_monthly, daily_points, EconomicSeriesProvider, FearGreedPoint, FredProvider,
    UnavailableEconomicSeriesProvider,
};
use providers::llm::{LlmProvider, OpenAiCompatibleProvider, UnavailableLlmProvider};
use providers::market::{MarketDataProvider, Quote, QuoteProvider, UnavailableMarketDataProvider};
use providers::news::{NewsItem, NewsProvider, UnavailableNewsProvider, WireNewsProvider};
use providers::sentiment::{SentimentProvider, SentimentScore, UnavailableSentimentProvider, WireSentimentProvider};
use futures_util::stream::{self, StreamExt};
use rate_limit::TokenBucketLimiter;
use retry::retry_with_backoff;
use std::sync::Arc;
use std::time::Duration;

/// Every externally visible Gateway operation, used as the vocabulary for
/// per-role tool allowlists (`OnlineTools`/`OfflineTools` in the Agent Runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    LlmComplete,
    Quote,
    Quotes,
    News,
    FearGreedHistory,
    Sentiment,
}

impl GatewayOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOp::LlmComplete => "llm_complete",
            GatewayOp::Quote => "quote",
            GatewayOp::Quotes => "quotes",
            GatewayOp::News => "news",
            GatewayOp::FearGreedHistory => "fear_greed_history",
            GatewayOp::Sentiment => "sentiment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm_complete" => Some(GatewayOp::LlmComplete),
            "quote" => Some(GatewayOp::Quote),
            "quotes" => Some(GatewayOp::Quotes),
            "news" => Some(GatewayOp::News),
            "fear_greed_history" => Some(GatewayOp::FearGreedHistory),
            "sentiment" => Some(GatewayOp::Sentiment),
            _ => None,
        }
    }
}

pub struct Gateway {
    llm: Arc<dyn LlmProvider>,
    market: Arc<dyn MarketDataProvider>,
    news: Arc<dyn NewsProvider>,
    economic_series: Arc<dyn EconomicSeriesProvider>,
    sentiment: Arc<dyn SentimentProvider>,

    quote_cache: TtlCache<Quote, GatewayError>,
    news_cache: TtlCache<Vec<NewsItem>, GatewayError>,
    series_cache: TtlCache<Vec<(NaiveDate, i32)>, GatewayError>,
    sentiment_cache: TtlCache<SentimentScore, GatewayError>,

    market_limiter: TokenBucketLimiter,
    news_limiter: TokenBucketLimiter,
    llm_limiter: TokenBucketLimiter,
    series_limiter: TokenBucketLimiter,
    sentiment_limiter: TokenBucketLimiter,

    retry_attempts: u32,
    quote_concurrency: usize,
}

impl Gateway {
    pub fn from_config(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_call_timeout_secs))
            .build()
            .expect("reqwest client config is valid");

        let llm: Arc<dyn LlmProvider> = match &config.llm_api_key {
            Some(key) => Arc::new(OpenAiCompatibleProvider::new(client.clone(), key.clone(), None, None)),
            None => Arc::new(UnavailableLlmProvider),
        };

        let market: Arc<dyn MarketDataProvider> = match &config.finnhub_api_key {
            Some(key) => Arc::new(QuoteProvider::new(client.clone(), key.clone(), None)),
            None => Arc::new(UnavailableMarketDataProvider),
        };

        let news: Arc<dyn NewsProvider> = match &config.finnhub_api_key {
            Some(key) => Arc::new(WireNewsProvider::new(client.clone(), key.clone(), None)),
            None => Arc::new(UnavailableNewsProvider),
        };

        let economic_series: Arc<dyn EconomicSeriesProvider> = match &config.fred_api_key {
            Some(key) => Arc::new(FredProvider::new(client.clone(), key.clone(), None)),
            None => Arc::new(UnavailableEconomicSeriesProvider),
        };

        let sentiment: Arc<dyn SentimentProvider> = match &config.finnhub_api_key {
            Some(key) => Arc::new(WireSentimentProvider::new(client.clone(), key.clone(), None)),
            None => Arc::new(UnavailableSentimentProvider),
        };

        Self {
            llm,
            market,
            news,
            economic_series,
            sentiment,
            quote_cache: TtlCache::new(Duration::from_secs(config.cache_quote_ttl_secs), config.cache_max_items),
            news_cache: TtlCache::new(Duration::from_secs(config.cache_news_ttl_secs), config.cache_max_items),
            series_cache: TtlCache::new(Duration::from_secs(config.cache_series_ttl_secs), config.cache_max_items),
            sentiment_cache: TtlCache::new(Duration::from_secs(config.cache_fear_greed_ttl_secs), config.cache_max_items),
            market_limiter: TokenBucketLimiter::new(config.rate_limit_market_burst, config.rate_limit_market_refill_per_sec),
            news_limiter: TokenBucketLimiter::new(config.rate_limit_news_burst, config.rate_limit_news_refill_per_sec),
            llm_limiter: TokenBucketLimiter::new(config.rate_limit_llm_burst, config.rate_limit_llm_refill_per_sec),
            series_limiter: TokenBucketLimiter::new(config.rate_limit_series_burst, config.rate_limit_series_refill_per_sec),
            sentiment_limiter: TokenBucketLimiter::new(config.rate_limit_sentiment_burst, config.rate_limit_sentiment_refill_per_sec),
            retry_attempts: config.gateway_retry_attempts,
            quote_concurrency: 8,
        }
    }

    pub async fn llm_complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, GatewayError> {
        self.llm_limiter
            .try_acquire()
            .map_err(|wait| GatewayError::RateLimited { retry_after_secs: wait.as_secs().max(1) })?;

        // LLM completions are not idempotent-safe to retry blindly (cost,
        // non-determinism) so they get one attempt, no backoff loop.
        self.llm.complete(system_prompt, user_prompt).await
    }

    pub async fn quote(&self, ticker: &str) -> Result<Quote, GatewayError> {
        self.market_limiter
            .try_acquire()
            .map_err(|wait| GatewayError::RateLimited { retry_after_secs: wait.as_secs().max(1) })?;

        let market = self.market.clone();
        let ticker_owned = ticker.to_string();
        let attempts = self.retry_attempts;

        self.quote_cache
            .get_or_fetch(ticker, || async move {
                retry_with_backoff(attempts, GatewayError::is_retryable, || {
                    let market = market.clone();
                    let ticker = ticker_owned.clone();
                    async move { market.quote(&ticker).await }
                })
                .await
            })
            .await
    }

    /// Batch quote fan-out, bounded to `quote_concurrency` in-flight requests.
    pub async fn quotes(&self, tickers: &[String]) -> Vec<(String, Result<Quote, GatewayError>)> {
        stream::iter(tickers.iter().cloned())
            .map(|ticker| async move {
                let result = self.quote(&ticker).await;
                (ticker, result)
            })
            .buffer_unordered(self.quote_concurrency)
            .collect()
            .await
    }

    pub async fn news(&self, ticker: &str, limit: usize) -> Result<Vec<NewsItem>, GatewayError> {
        self.news_limiter
            .try_acquire()
            .map_err(|wait| GatewayError::RateLimited { retry_after_secs: wait.as_secs().max(1) })?;

        let provider = self.news.clone();
        let ticker_owned = ticker.to_string();
        let attempts = self.retry_attempts;
        let key = format!("{ticker}:{limit}");

        self.news_cache
            .get_or_fetch(&key, || async move {
                retry_with_backoff(attempts, GatewayError::is_retryable, || {
                    let provider = provider.clone();
                    let ticker = ticker_owned.clone();
                    async move { provider.headlines(&ticker, limit).await }
                })
                .await
            })
            .await
    }

    /// `aggregation` of `"monthly"` collapses the trailing `days` window to
    /// one mean point per calendar month; anything else ("daily") returns one
    /// point per raw observation. Both read the same cached daily series.
    pub async fn fear_greed_history(&self, days: u32, aggregation: &str) -> Result<Vec<FearGreedPoint>, GatewayError> {
        self.series_limiter
            .try_acquire()
            .map_err(|wait| GatewayError::RateLimited { retry_after_secs: wait.as_secs().max(1) })?;

        let provider = self.economic_series.clone();
        let attempts = self.retry_attempts;
        let key = format!("fear_greed:{days}");

        let daily = self
            .series_cache
            .get_or_fetch(&key, || async move {
                retry_with_backoff(attempts, GatewayError::is_retryable, || {
                    let provider = provider.clone();
                    async move { provider.fear_greed_daily(days).await }
                })
                .await
            })
            .await?;

        Ok(if aggregation == "monthly" { aggregate_monthly(&daily) } else { daily_points(&daily) })
    }

    pub async fn sentiment(&self, ticker: &str) -> Result<SentimentScore, GatewayError> {
        self.sentiment_limiter
            .try_acquire()
            .map_err(|wait| GatewayError::RateLimited { retry_after_secs: wait.as_secs().max(1) })?;

        let provider = self.sentiment.clone();
        let ticker_owned = ticker.to_string();
        let attempts = self.retry_attempts;

        self.sentiment_cache
            .get_or_fetch(ticker, || async move {
                retry_with_backoff(attempts, GatewayError::is_retryable, || {
                    let provider = provider.clone();
                    let ticker = ticker_owned.clone();
                    async move { provider.sentiment(&ticker).await }
                })
                .await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_providers_surface_unavailable_error() {
        let mut config = Config::from_env();
        config.llm_api_key = None;
        config.finnhub_api_key = None;
        config.fred_api_key = None;
        let gateway = Gateway::from_config(&config);

        let err = gateway.llm_complete("system", "hi").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));

        let err = gateway.quote("AAPL").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));

        let err = gateway.news("AAPL", 5).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));

        let err = gateway.fear_greed_history(90, "monthly").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));

        let err = gateway.sentiment("AAPL").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unavailable_error_is_not_retried() {
        let mut config = Config::from_env();
        config.finnhub_api_key = None;
        config.gateway_retry_attempts = 3;
        let gateway = Gateway::from_config(&config);

        // `quote` on a disabled provider must return on the first attempt;
        // if it were retried 3x with backoff this call would take seconds.
        let started = std::time::Instant::now();
        let err = gateway.quote("AAPL").await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(_)));
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
