//! Conductor binary entry point.
//!
//! Usage:
//! ```bash
//! conductor --config conductor.toml
//! conductor --bind 0.0.0.0:4711 --no-http
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use testconductor_server::{http, listen, Conductor, Config};
use tracing_subscriber::EnvFilter;

/// Conductor for multi-node tests.
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override the player-facing bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP bind address
    #[arg(long)]
    http_bind: Option<String>,

    /// Disable the HTTP endpoints
    #[arg(long)]
    no_http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(bind) = cli.http_bind {
        config.http.bind_address = bind;
    }
    if cli.no_http {
        config.http.enabled = false;
    }

    let conductor = Conductor::new(config.clone());
    let (addr, accept_task) = listen(conductor.clone(), &config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    tracing::info!("Players connect to {}", addr);

    if config.http.enabled {
        let listener = tokio::net::TcpListener::bind(&config.http.bind_address)
            .await
            .with_context(|| format!("Failed to bind HTTP on {}", config.http.bind_address))?;
        tracing::info!("HTTP endpoints on {}", listener.local_addr()?);
        let router = http::build_router(conductor.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("HTTP server failed: {}", e);
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Ctrl-C received, shutting down");

    conductor.shutdown();
    accept_task.await??;
    Ok(())
}
