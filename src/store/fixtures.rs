//! Static seed-data loaders for the bootstrapper (C9).
//!
//! The *content* of these fixtures (famous-investor portfolios,
//! economic-event calendars) is out of scope; only the loading mechanism
//! lives here, in the same seed-on-first-run style as `UserStore::ensure_admin`,
//! generalized to bundled JSON assets instead of hardcoded rows.

use super::SessionStore;
use anyhow::{Context, Result};
use rusqlite::params;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PortfolioHolding {
    investor: String,
    ticker: String,
    weight: f64,
    note: String,
}

#[derive(Debug, Deserialize)]
struct EconomicEvent {
    event_date: String,
    title: String,
    category: String,
    impact: String,
}

impl SessionStore {
    fn fixtures_conn(&self) -> Result<rusqlite::Connection> {
        rusqlite::Connection::open(&self.db_path).context("failed to open session store for fixtures")
    }

    /// Idempotently loads `assets/portfolio_seed.json` into
    /// `investor_portfolio_holdings`. Safe to call on every startup — rows
    /// are upserted by `(investor, ticker)`.
    pub fn seed_portfolio_fixtures(&self, json: &str) -> Result<usize> {
        let conn = self.fixtures_conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS investor_portfolio_holdings (
                investor TEXT NOT NULL,
                ticker TEXT NOT NULL,
                weight REAL NOT NULL,
                note TEXT NOT NULL,
                PRIMARY KEY (investor, ticker)
            );",
        )?;

        let holdings: Vec<PortfolioHolding> =
            serde_json::from_str(json).context("invalid portfolio fixture json")?;

        for holding in &holdings {
            conn.execute(
                "INSERT INTO investor_portfolio_holdings (investor, ticker, weight, note)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(investor, ticker) DO UPDATE SET weight = excluded.weight, note = excluded.note",
                params![holding.investor, holding.ticker, holding.weight, holding.note],
            )?;
        }

        Ok(holdings.len())
    }

    /// Idempotently loads `assets/economic_events_seed.json` into
    /// `economic_events`. Rows are upserted by `(event_date, title)`.
    pub fn seed_economic_event_fixtures(&self, json: &str) -> Result<usize> {
        let conn = self.fixtures_conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS economic_events (
                event_date TEXT NOT NULL,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                impact TEXT NOT NULL,
                PRIMARY KEY (event_date, title)
            );",
        )?;

        let events: Vec<EconomicEvent> =
            serde_json::from_str(json).context("invalid economic event fixture json")?;

        for event in &events {
            conn.execute(
                "INSERT INTO economic_events (event_date, title, category, impact)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(event_date, title) DO UPDATE SET category = excluded.category, impact = excluded.impact",
                params![event.event_date, event.title, event.category, event.impact],
            )?;
        }

        Ok(events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_store;

    const PORTFOLIO_JSON: &str = r#"[
        {"investor": "warren_buffett", "ticker": "AAPL", "weight": 0.4, "note": "largest holding"}
    ]"#;

    const EVENTS_JSON: &str = r#"[
        {"event_date": "2026-01-28", "title": "FOMC rate decision", "category": "monetary_policy", "impact": "high"}
    ]"#;

    #[test]
    fn portfolio_seed_is_idempotent() {
        let (store, _temp) = test_store();
        let first = store.seed_portfolio_fixtures(PORTFOLIO_JSON).unwrap();
        let second = store.seed_portfolio_fixtures(PORTFOLIO_JSON).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 1);

        let conn = rusqlite::Connection::open(&store.db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM investor_portfolio_holdings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn economic_event_seed_is_idempotent() {
        let (store, _temp) = test_store();
        store.seed_economic_event_fixtures(EVENTS_JSON).unwrap();
        store.seed_economic_event_fixtures(EVENTS_JSON).unwrap();

        let conn = rusqlite::Connection::open(&store.db_path).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM economic_events", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}
