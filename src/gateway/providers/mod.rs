//! One trait per provider kind, each with exactly one concrete HTTP-backed
//! implementation gated by its credential env var. The upstream wire formats
//! are intentionally out of scope — every implementation calls a generically
//! shaped JSON endpoint and parses permissively via `serde_json::Value`, so
//! Gateway behavior (caching, rate limiting, retry, aggregation) is fully
//! exercised without depending on any one vendor's schema.

pub mod fred;
pub mod llm;
pub mod market;
pub mod news;
pub mod sentiment;

pub use fred::{EconomicSeriesProvider, FearGreedPoint, FredProvider};
pub use llm::{LlmProvider, OpenAiCompatibleProvider};
pub use market::{MarketDataProvider, Quote, QuoteProvider};
pub use news::{NewsItem, NewsProvider, WireNewsProvider};
pub use sentiment::{SentimentProvider, SentimentScore, WireSentimentProvider};
