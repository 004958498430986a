//! Runtime configuration
//! Mission: centralize env-driven tunables the way main.rs used to inline them

use std::env;
use std::path::{Path, PathBuf};

fn default_data_path(filename: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    base.join(filename).to_string_lossy().to_string()
}

fn resolve_data_path(env_value: Option<String>, default_filename: &str) -> String {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) else {
        return default_data_path(default_filename);
    };

    let p = PathBuf::from(raw);
    if p.is_absolute() {
        return p.to_string_lossy().to_string();
    }
    base.join(p).to_string_lossy().to_string()
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Process-wide configuration, built once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,

    pub admin_username: String,
    pub admin_password: Option<String>,
    pub admin_email: Option<String>,
    pub allowed_origins: Vec<String>,

    pub llm_api_key: Option<String>,
    pub fred_api_key: Option<String>,
    pub finnhub_api_key: Option<String>,

    pub max_debate_rounds: u32,
    pub max_risk_rounds: u32,
    pub max_tool_rounds: u32,
    /// Toggles each analyst role (spec.md §9 "dynamic tool binding") between
    /// its `OnlineTools` (live vendor fetch) and `OfflineTools` (reason over
    /// already-gathered state only) capability set.
    pub online_tools: bool,

    pub rate_limit_market_burst: u32,
    pub rate_limit_market_refill_per_sec: f64,
    pub rate_limit_news_burst: u32,
    pub rate_limit_news_refill_per_sec: f64,
    pub rate_limit_llm_burst: u32,
    pub rate_limit_llm_refill_per_sec: f64,
    pub rate_limit_series_burst: u32,
    pub rate_limit_series_refill_per_sec: f64,
    pub rate_limit_sentiment_burst: u32,
    pub rate_limit_sentiment_refill_per_sec: f64,

    pub gateway_call_timeout_secs: u64,
    pub agent_step_budget_secs: u64,
    pub session_deadline_secs: u64,
    pub gateway_retry_attempts: u32,

    pub cache_quote_ttl_secs: u64,
    pub cache_news_ttl_secs: u64,
    pub cache_series_ttl_secs: u64,
    pub cache_fear_greed_ttl_secs: u64,
    pub cache_max_items: usize,

    pub rate_limit_global_max: u32,
    pub rate_limit_global_window_secs: u64,
    pub rate_limit_login_max: u32,
    pub rate_limit_login_window_secs: u64,
    pub rate_limit_start_analysis_max: u32,
    pub rate_limit_start_analysis_window_secs: u64,

    pub progress_buffer_size: usize,
    pub progress_linger_secs: u64,

    pub debug_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Config {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            db_path: resolve_data_path(
                env::var("DB_PATH").or_else(|_| env::var("DATABASE_PATH")).ok(),
                "analyst_desk.db",
            ),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                "dev-secret-change-in-production-minimum-32-characters".to_string()
            }),
            jwt_expiration_hours: env_num("JWT_EXPIRATION_HOURS", 24),

            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            admin_email: env::var("ADMIN_EMAIL").ok(),
            allowed_origins,

            llm_api_key: env::var("LLM_API_KEY").ok().filter(|s| !s.is_empty()),
            fred_api_key: env::var("FRED_API_KEY").ok().filter(|s| !s.is_empty()),
            finnhub_api_key: env::var("FINNHUB_API_KEY").ok().filter(|s| !s.is_empty()),

            max_debate_rounds: env_num("MAX_DEBATE_ROUNDS", 2),
            max_risk_rounds: env_num("MAX_RISK_ROUNDS", 1),
            max_tool_rounds: env_num("MAX_TOOL_ROUNDS", 8),
            online_tools: env_bool("ONLINE_TOOLS", true),

            rate_limit_market_burst: env_num("RATE_LIMIT_MARKET_BURST", 10),
            rate_limit_market_refill_per_sec: env_num("RATE_LIMIT_MARKET_REFILL_PER_SEC", 5.0),
            rate_limit_news_burst: env_num("RATE_LIMIT_NEWS_BURST", 10),
            rate_limit_news_refill_per_sec: env_num("RATE_LIMIT_NEWS_REFILL_PER_SEC", 5.0),
            rate_limit_llm_burst: env_num("RATE_LIMIT_LLM_BURST", 5),
            rate_limit_llm_refill_per_sec: env_num("RATE_LIMIT_LLM_REFILL_PER_SEC", 2.0),
            rate_limit_series_burst: env_num("RATE_LIMIT_SERIES_BURST", 10),
            rate_limit_series_refill_per_sec: env_num("RATE_LIMIT_SERIES_REFILL_PER_SEC", 5.0),
            rate_limit_sentiment_burst: env_num("RATE_LIMIT_SENTIMENT_BURST", 10),
            rate_limit_sentiment_refill_per_sec: env_num("RATE_LIMIT_SENTIMENT_REFILL_PER_SEC", 5.0),

            gateway_call_timeout_secs: env_num("GATEWAY_CALL_TIMEOUT_SECS", 30),
            agent_step_budget_secs: env_num("AGENT_STEP_BUDGET_SECS", 120),
            session_deadline_secs: env_num("SESSION_DEADLINE_SECS", 30 * 60),
            gateway_retry_attempts: env_num("GATEWAY_RETRY_ATTEMPTS", 3),

            cache_quote_ttl_secs: env_num("CACHE_QUOTE_TTL_SECS", 15),
            cache_news_ttl_secs: env_num("CACHE_NEWS_TTL_SECS", 600),
            cache_series_ttl_secs: env_num("CACHE_SERIES_TTL_SECS", 300),
            cache_fear_greed_ttl_secs: env_num("CACHE_FEAR_GREED_TTL_SECS", 600),
            cache_max_items: env_num("CACHE_MAX_ITEMS", 10_000),

            rate_limit_global_max: env_num("RATE_LIMIT_GLOBAL_MAX", 500),
            rate_limit_global_window_secs: env_num("RATE_LIMIT_GLOBAL_WINDOW_SECS", 60),
            rate_limit_login_max: env_num("RATE_LIMIT_LOGIN_MAX", 5),
            rate_limit_login_window_secs: env_num("RATE_LIMIT_LOGIN_WINDOW_SECS", 300),
            rate_limit_start_analysis_max: env_num("RATE_LIMIT_START_ANALYSIS_MAX", 10),
            rate_limit_start_analysis_window_secs: env_num(
                "RATE_LIMIT_START_ANALYSIS_WINDOW_SECS",
                300,
            ),

            progress_buffer_size: env_num("PROGRESS_BUFFER_SIZE", 64),
            progress_linger_secs: env_num("PROGRESS_LINGER_SECS", 30),

            debug_mode: env_bool("APP_DEBUG", false) || {
                env::var("APP_ENV").map(|v| v.eq_ignore_ascii_case("debug")).unwrap_or(false)
            },
        }
    }

    pub fn load_env() {
        let _ = dotenv::dotenv();
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        for p in [manifest_dir.join(".env"), manifest_dir.join("../.env")] {
            if p.exists() {
                let _ = dotenv::from_path(&p);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        std::env::remove_var("MAX_DEBATE_ROUNDS");
        std::env::remove_var("MAX_RISK_ROUNDS");
        let cfg = Config::from_env();
        assert_eq!(cfg.max_debate_rounds, 2);
        assert_eq!(cfg.max_risk_rounds, 1);
        assert_eq!(cfg.max_tool_rounds, 8);
        assert_eq!(cfg.admin_username, "admin");
    }

    #[test]
    fn allowed_origins_parses_csv() {
        std::env::set_var("ALLOWED_ORIGINS", "https://a.example, https://b.example");
        let cfg = Config::from_env();
        assert_eq!(
            cfg.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        std::env::remove_var("ALLOWED_ORIGINS");
    }
}
