//! Economic time-series provider (FRED-shaped), plus the fear/greed
//! classification logic shared by the `/market/fear-greed/history` endpoint.

use crate::gateway::error::GatewayError;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FearGreedPoint {
    pub date: NaiveDate,
    pub value: i32,
    pub label: &'static str,
}

/// Fixed-threshold classification: ≤25 extreme fear, ≤45 fear, ≤55 neutral,
/// ≤75 greed, else extreme greed.
pub fn classify_fear_greed(value: i32) -> &'static str {
    match value {
        v if v <= 25 => "extreme_fear",
        v if v <= 45 => "fear",
        v if v <= 55 => "neutral",
        v if v <= 75 => "greed",
        _ => "extreme_greed",
    }
}

/// One point per raw daily observation, classified independently.
pub fn daily_points(daily: &[(NaiveDate, i32)]) -> Vec<FearGreedPoint> {
    daily
        .iter()
        .map(|(date, value)| FearGreedPoint { date: *date, value: *value, label: classify_fear_greed(*value) })
        .collect()
}

/// Aggregates daily fear/greed readings into one point per calendar month —
/// the mean of that month's values, rounded to the nearest integer.
pub fn aggregate_monthly(daily: &[(NaiveDate, i32)]) -> Vec<FearGreedPoint> {
    use std::collections::BTreeMap;

    let mut buckets: BTreeMap<(i32, u32), Vec<i32>> = BTreeMap::new();
    for (date, value) in daily {
        buckets.entry((date.year(), date.month())).or_default().push(*value);
    }

    buckets
        .into_iter()
        .map(|((year, month), values)| {
            let mean = values.iter().sum::<i32>() as f64 / values.len() as f64;
            let rounded = mean.round() as i32;
            FearGreedPoint {
                date: NaiveDate::from_ymd_opt(year, month, 1).expect("valid y/m"),
                value: rounded,
                label: classify_fear_greed(rounded),
            }
        })
        .collect()
}

#[async_trait]
pub trait EconomicSeriesProvider: Send + Sync {
    /// Raw daily `(date, fear/greed value)` observations for the trailing
    /// `days` window, oldest first. Callers aggregate or classify as needed
    /// (see `aggregate_monthly`/`daily_points`) so both `aggregation=daily`
    /// and `aggregation=monthly` read from one real series.
    async fn fear_greed_daily(&self, days: u32) -> Result<Vec<(NaiveDate, i32)>, GatewayError>;
}

/// Gated on `FRED_API_KEY`.
pub struct FredProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FredProvider {
    pub fn new(client: Client, api_key: String, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.stlouisfed.org/fred".to_string()),
        }
    }
}

#[async_trait]
impl EconomicSeriesProvider for FredProvider {
    async fn fear_greed_daily(&self, days: u32) -> Result<Vec<(NaiveDate, i32)>, GatewayError> {
        let resp = self
            .client
            .get(format!("{}/series/observations", self.base_url))
            .query(&[
                ("series_id", "VIXCLS"),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
            ])
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
            return Err(GatewayError::Upstream(format!("fred provider returned {}", resp.status())));
        }

        let v: serde_json::Value = resp.json().await.map_err(|e| GatewayError::Upstream(e.to_string()))?;
        let observations = v["observations"].as_array().cloned().unwrap_or_default();

        let mut daily: Vec<(NaiveDate, i32)> = observations
            .into_iter()
            .filter_map(|obs| {
                let date = obs["date"].as_str()?.parse::<NaiveDate>().ok()?;
                let raw = obs["value"].as_str()?.parse::<f64>().ok()?;
                // Map a VIX-like reading onto a 0-100 fear/greed scale: higher
                // volatility -> more fear, inverted and clamped.
                let scaled = (100.0 - raw.clamp(0.0, 100.0)).round() as i32;
                Some((date, scaled))
            })
            .collect();

        daily.sort_by_key(|(date, _)| *date);
        if daily.len() as u32 > days {
            let skip = daily.len() - days as usize;
            daily.drain(0..skip);
        }
        Ok(daily)
    }
}

pub struct UnavailableEconomicSeriesProvider;

#[async_trait]
impl EconomicSeriesProvider for UnavailableEconomicSeriesProvider {
    async fn fear_greed_daily(&self, _days: u32) -> Result<Vec<(NaiveDate, i32)>, GatewayError> {
        Err(GatewayError::Unavailable("FRED_API_KEY not configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_fixed_thresholds() {
        assert_eq!(classify_fear_greed(0), "extreme_fear");
        assert_eq!(classify_fear_greed(25), "extreme_fear");
        assert_eq!(classify_fear_greed(26), "fear");
        assert_eq!(classify_fear_greed(45), "fear");
        assert_eq!(classify_fear_greed(46), "neutral");
        assert_eq!(classify_fear_greed(55), "neutral");
        assert_eq!(classify_fear_greed(56), "greed");
        assert_eq!(classify_fear_greed(75), "greed");
        assert_eq!(classify_fear_greed(76), "extreme_greed");
        assert_eq!(classify_fear_greed(100), "extreme_greed");
    }

    #[test]
    fn monthly_aggregation_means_and_rounds() {
        let daily = vec![
            (NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 20),
            (NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(), 21),
            (NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), 60),
        ];
        let points = aggregate_monthly(&daily);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, 21); // mean(20,21) = 20.5 -> rounds to 21
        assert_eq!(points[0].label, "extreme_fear");
        assert_eq!(points[1].value, 60);
        assert_eq!(points[1].label, "greed");
    }

    #[test]
    fn daily_points_classify_each_observation_independently() {
        let daily = vec![
            (NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 10),
            (NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(), 90),
        ];
        let points = daily_points(&daily);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].label, "extreme_fear");
        assert_eq!(points[1].label, "extreme_greed");
    }
}
