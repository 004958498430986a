//! Analyst Desk — investment-recommendation orchestration engine.
//! Mission: fan a ticker + date out across an analyst/debate/trader/risk
//! pipeline and persist the resulting report.

use analyst_desk::api::{self, AppState};
use analyst_desk::auth::{AuthState, JwtHandler};
use analyst_desk::bootstrap::{self, ExitCode};
use analyst_desk::config::Config;
use analyst_desk::gateway::Gateway;
use analyst_desk::memory::{HashingEmbeddingProvider, MemoryStore};
use analyst_desk::orchestrator::Orchestrator;
use analyst_desk::progress::ProgressBus;
use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::prelude::*;

/// Analyst Desk server / bootstrapper.
#[derive(Parser, Debug)]
#[command(name = "analyst-desk", version, about)]
struct Cli {
    /// Run schema init, admin seed and fixture load, then exit without
    /// starting the HTTP server.
    #[arg(long)]
    seed_only: bool,

    /// Override the bind address (defaults to `BIND_ADDR` / `0.0.0.0:3000`).
    #[arg(long, env = "BIND_ADDR")]
    bind_addr: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "analyst_desk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ProcessExitCode {
    Config::load_env();
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(bind_addr) = cli.bind_addr {
        config.bind_addr = bind_addr;
    }

    let bootstrapped = match bootstrap::run(&config) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "startup bootstrap failed");
            return to_process_code(e.code);
        }
    };

    if cli.seed_only {
        info!("seed-only mode: bootstrap complete, exiting");
        return ProcessExitCode::from(ExitCode::Ok as u8);
    }

    match run_server(config, bootstrapped).await {
        Ok(()) => ProcessExitCode::from(ExitCode::Ok as u8),
        Err(e) => {
            tracing::error!(error = %e, "server exited with error");
            ProcessExitCode::FAILURE
        }
    }
}

fn to_process_code(code: ExitCode) -> ProcessExitCode {
    ProcessExitCode::from(code as u8)
}

async fn run_server(config: Config, bootstrapped: bootstrap::Bootstrapped) -> anyhow::Result<()> {
    let store = Arc::new(bootstrapped.session_store);
    let user_store = Arc::new(bootstrapped.user_store);

    let memory = Arc::new(
        MemoryStore::new(&config.db_path, Arc::new(HashingEmbeddingProvider::default()))
            .context("failed to initialize memory store")?,
    );

    let gateway = Arc::new(Gateway::from_config(&config));
    let progress = Arc::new(ProgressBus::new(config.progress_buffer_size, config.progress_linger_secs));
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), memory.clone(), gateway.clone(), progress.clone(), &config));

    let jwt_handler = Arc::new(JwtHandler::with_expiration_hours(config.jwt_secret.clone(), config.jwt_expiration_hours));
    let auth_state = AuthState::new(user_store, jwt_handler);

    let app_state = AppState {
        store,
        memory,
        gateway,
        orchestrator,
        progress: progress.clone(),
        cancel_registry: Default::default(),
        config: Arc::new(config.clone()),
    };

    tokio::spawn(sweep_progress_bus(progress));

    let app = api::build_router(app_state, auth_state, &config);

    let addr: SocketAddr = config.bind_addr.parse().context("invalid BIND_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind listener")?;
    info!(%addr, "analyst-desk listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;

    Ok(())
}

/// Periodically drops progress channels whose linger window has elapsed.
async fn sweep_progress_bus(progress: Arc<ProgressBus>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        progress.sweep_expired();
    }
}
