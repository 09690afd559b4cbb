//! LeadPay Server
//!
//! Lead capture, PIX payment sessions and payment webhook reconciliation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use leadpay::config::{AppConfig, RuntimeMode};
use leadpay::server::{app_router, open_ledger, AppState};
use tracing_subscriber::EnvFilter;

/// LeadPay Server
#[derive(Parser, Debug)]
#[command(name = "leadpay-server")]
#[command(author = "LeadPay Team <team@leadpay.dev>")]
#[command(version)]
#[command(about = "Lead capture and payment webhook reconciliation server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "LEADPAY_PORT", default_value = "3003")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, env = "LEADPAY_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Runtime mode; relaxed accepts unsigned callbacks when no secret is set.
    /// Falls back to `LEADPAY_MODE`, then hardened.
    #[arg(short, long, value_enum)]
    mode: Option<RuntimeMode>,

    /// SQLite database file; leads are kept in memory when omitted
    #[arg(long, env = "LEADPAY_DATABASE")]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = AppConfig::from_env().context("invalid configuration")?;
    config.host = args.host;
    config.port = args.port;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    config.database = args.database;

    if config.mode == RuntimeMode::Relaxed {
        tracing::warn!("Running in RELAXED mode: do not use in production");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;

    let ledger = open_ledger(&config).context("failed to open lead ledger")?;
    let state = Arc::new(AppState::new(config, ledger).context("failed to build application state")?);
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("LeadPay server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("LeadPay server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
