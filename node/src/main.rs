// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Prism Ledger Node
//!
//! Entry point for the `prism-node` binary. Parses CLI arguments, loads the
//! configuration, initializes logging and metrics, and serves the ledger
//! registry over HTTP/WS.
//!
//! Subcommands:
//!
//! - `run`: start the API and metrics servers
//! - `config`: print the effective configuration as TOML
//! - `version`: print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use cli::{Commands, PrismNodeCli, RunArgs};
use config::NodeConfig;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PrismNodeCli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = effective_config(&args)?;
            run_node(config).await
        }
        Commands::Config(args) => {
            let config = effective_config(&args)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// The configuration file (or defaults) with command-line overrides applied.
fn effective_config(args: &RunArgs) -> Result<NodeConfig> {
    let mut config = NodeConfig::load(args.config.as_deref())?;
    config.apply_overrides(args);
    Ok(config)
}

/// Starts the API server and, unless disabled, the metrics server. Returns
/// once either server fails or a shutdown signal arrives.
async fn run_node(config: NodeConfig) -> Result<()> {
    logging::init_logging(&config.logging.level, config.logging.format);

    tracing::info!(
        api = %config.api.listen,
        metrics = %config.metrics.listen,
        metrics_enabled = config.metrics.enabled,
        event_capacity = config.events.capacity,
        journal_capacity = config.events.journal_capacity,
        "starting prism-node"
    );

    let node_metrics = Arc::new(NodeMetrics::new());
    let app_state = api::AppState::new(
        format!(
            "{} (engine {})",
            env!("CARGO_PKG_VERSION"),
            prism_contracts::config::ENGINE_VERSION,
        ),
        Arc::clone(&node_metrics),
        config.events.capacity,
        config.events.journal_capacity,
    );

    // --- API server ---
    let api_router = api::create_router(app_state, config.api.cors);
    let api_listener = tokio::net::TcpListener::bind(config.api.listen)
        .await
        .with_context(|| format!("failed to bind API listener on {}", config.api.listen))?;
    tracing::info!("API server listening on {}", config.api.listen);

    // --- Metrics server ---
    let metrics_server = if config.metrics.enabled {
        let metrics_router = axum::Router::new()
            .route("/metrics", axum::routing::get(metrics::metrics_handler))
            .with_state(Arc::clone(&node_metrics));
        let metrics_listener = tokio::net::TcpListener::bind(config.metrics.listen)
            .await
            .with_context(|| {
                format!("failed to bind metrics listener on {}", config.metrics.listen)
            })?;
        tracing::info!("Metrics server listening on {}", config.metrics.listen);
        Some((metrics_listener, metrics_router))
    } else {
        None
    };

    let serve_metrics = async move {
        match metrics_server {
            Some((listener, router)) => axum::serve(listener, router).await,
            None => std::future::pending().await,
        }
    };

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = serve_metrics => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("prism-node stopped");
    Ok(())
}

fn print_version() {
    println!("prism-node {}", env!("CARGO_PKG_VERSION"));
    println!("engine     {}", prism_contracts::config::ENGINE_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
