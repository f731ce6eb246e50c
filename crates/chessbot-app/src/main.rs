//! Chess bot entry point.
//!
//! Binary name: `chessbot`
//!
//! Parses CLI flags, sets up tracing, loads the configuration, opens the
//! database, logs in to the homeserver and runs the sync loop until SIGINT
//! or SIGTERM.

mod cli;
mod state;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use chessbot_infra::config::{load_bot_config, read_password};
use chessbot_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::Cli;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_bot_config(&cli.config)
        .await
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    init_tracing(&TracingOptions {
        level: cli.loglevel.clone(),
        log_file: cli.logfile.clone(),
        json: config.logging.json,
        enable_otel: config.logging.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli, config).await;
    if let Err(error) = &result {
        tracing::error!("chessbot stopped with an error: {error:#}");
    }
    shutdown_tracing();
    result
}

async fn run(cli: Cli, config: chessbot_types::config::BotConfig) -> anyhow::Result<()> {
    let password = read_password(&config.password_file)
        .await
        .context("failed to read password file")?;

    let state = AppState::init(config, &cli.dbfile, &password).await?;
    tracing::info!(
        user_id = %state.config.username,
        device_id = %state.device_id,
        "logged in"
    );

    tokio::spawn(cancel_on_signal(state.cancel.clone()));

    state.sync.run(state.cancel.clone()).await;

    // New dispatches are refused from here on; queued ones still run.
    tracing::info!(rooms = state.dispatcher.active_rooms(), "sync stopped, draining room workers");
    state.dispatcher.shutdown().await;
    state.db_pool.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    shutdown_signal().await;
    tracing::info!("shutdown signal received");
    token.cancel();
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
