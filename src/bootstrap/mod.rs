//! Startup bootstrapper (C9)
//! Mission: turn a freshly-deployed `Config` into an initialized, seeded
//! store the server can run against, the same one-shot job `main()` used
//! to do inline before spawning the listener.

use crate::config::Config;
use crate::store::SessionStore;
use anyhow::Context;
use std::fmt;
use tracing::{info, warn};

const PORTFOLIO_SEED_JSON: &str = include_str!("../../assets/portfolio_seed.json");
const ECONOMIC_EVENTS_SEED_JSON: &str = include_str!("../../assets/economic_events_seed.json");

/// Process exit codes. Documented here because `main.rs` maps every
/// bootstrap failure to one of these instead of a bare `process::exit(1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    FatalConfig = 1,
    DbInit = 2,
    SeedFailure = 3,
}

#[derive(Debug)]
pub struct BootstrapError {
    pub code: ExitCode,
    pub source: anyhow::Error,
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bootstrap failed (exit {}): {}", self.code as i32, self.source)
    }
}

impl std::error::Error for BootstrapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.source()
    }
}

/// Everything `main()` needs handed back after a successful bootstrap.
pub struct Bootstrapped {
    pub session_store: SessionStore,
    pub user_store: crate::auth::user_store::UserStore,
}

/// Runs schema init, admin seeding and fixture loading in sequence.
///
/// Each stage fails closed: a `SessionStore`/`UserStore` construction error
/// is reported as [`ExitCode::DbInit`], a fixture-loading error as
/// [`ExitCode::SeedFailure`]. Config itself is validated by the caller before
/// this runs, so there is no `ExitCode::FatalConfig` path inside this
/// function — it is reserved for `main.rs`'s own pre-bootstrap checks
/// (missing bind address, unparsable CLI flags).
pub fn run(config: &Config) -> Result<Bootstrapped, BootstrapError> {
    info!(db_path = %config.db_path, "initializing session store schema");
    let session_store = SessionStore::new(&config.db_path).map_err(|e| BootstrapError {
        code: ExitCode::DbInit,
        source: e.context("failed to initialize session store"),
    })?;

    let user_store = crate::auth::user_store::UserStore::new(&config.db_path).map_err(|e| BootstrapError {
        code: ExitCode::DbInit,
        source: e.context("failed to initialize user store"),
    })?;

    match user_store.ensure_admin(
        &config.admin_username,
        config.admin_password.as_deref(),
        config.admin_email.as_deref(),
    ) {
        Ok(Some(generated_password)) => {
            warn!(
                username = %config.admin_username,
                "generated admin password (record this now, it will not be shown again): {}",
                generated_password
            );
        }
        Ok(None) => {
            info!("admin account already present, skipping seed");
        }
        Err(e) => {
            return Err(BootstrapError {
                code: ExitCode::DbInit,
                source: e.context("failed to seed admin account"),
            })
        }
    }

    let portfolio_rows = session_store
        .seed_portfolio_fixtures(PORTFOLIO_SEED_JSON)
        .context("failed to load investor portfolio fixtures")
        .map_err(|e| BootstrapError { code: ExitCode::SeedFailure, source: e })?;

    let event_rows = session_store
        .seed_economic_event_fixtures(ECONOMIC_EVENTS_SEED_JSON)
        .context("failed to load economic event fixtures")
        .map_err(|e| BootstrapError { code: ExitCode::SeedFailure, source: e })?;

    info!(portfolio_rows, event_rows, "loaded static fixtures");

    Ok(Bootstrapped { session_store, user_store })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(db_path: &str) -> Config {
        let mut config = Config::from_env();
        config.db_path = db_path.to_string();
        config.admin_password = Some("test-password-0123456789".to_string());
        config
    }

    #[test]
    fn bootstrap_succeeds_and_is_idempotent() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let config = test_config(temp.path().to_str().unwrap());

        let first = run(&config).unwrap();
        drop(first);
        let second = run(&config).unwrap();
        drop(second);
    }

    #[test]
    fn bootstrap_seeds_fixtures() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let config = test_config(temp.path().to_str().unwrap());
        let bootstrapped = run(&config).unwrap();

        let conn = rusqlite::Connection::open(temp.path()).unwrap();
        let holdings: i64 = conn
            .query_row("SELECT COUNT(*) FROM investor_portfolio_holdings", [], |r| r.get(0))
            .unwrap();
        let events: i64 =
            conn.query_row("SELECT COUNT(*) FROM economic_events", [], |r| r.get(0)).unwrap();
        assert_eq!(holdings, 5);
        assert_eq!(events, 4);
        drop(bootstrapped);
    }
}
