//! pocketledger backend entry point.
//!
//! Loads configuration, initialises structured logging, and serves the
//! config/auth/finance API with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use pocketledger::config::AppConfig;
use pocketledger::server;
use pocketledger::server::routes::BackendState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    info!(
        port = cfg.server.port,
        "pocketledger backend v{} starting up",
        env!("CARGO_PKG_VERSION")
    );

    let admin_token = AppConfig::resolve_env(&cfg.server.admin_token_env)?;
    let state = Arc::new(BackendState::new(admin_token));

    tokio::select! {
        result = server::serve(state, cfg.server.port) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }

    info!("pocketledger backend shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pocketledger=info"));

    let json_logging = std::env::var("POCKETLEDGER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
