//! # CLI Interface
//!
//! Command-line structure for `prism-node`, built with `clap` derive.
//! Subcommands: `run`, `config` and `version`.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Prism ledger service.
///
/// Hosts the ledger registry behind an HTTP/WebSocket API and exposes
/// Prometheus metrics on a separate listener.
#[derive(Parser, Debug)]
#[command(
    name = "prism-node",
    about = "Prism ledger service",
    version,
    propagate_version = true
)]
pub struct PrismNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API and metrics servers.
    Run(RunArgs),
    /// Print the effective configuration (file plus flags) as TOML and exit.
    Config(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments shared by `run` and `config`. Every flag is optional and, when
/// given, overrides the value from the configuration file.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML). Defaults apply without one.
    #[arg(long, short = 'c', env = "PRISM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address for the HTTP/WS API.
    #[arg(long, env = "PRISM_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Address for the Prometheus metrics endpoint.
    #[arg(long, env = "PRISM_METRICS_LISTEN")]
    pub metrics_listen: Option<SocketAddr>,

    /// Do not start the metrics listener.
    #[arg(long)]
    pub no_metrics: bool,

    /// Do not attach the CORS layer to the API.
    #[arg(long)]
    pub no_cors: bool,

    /// Default `EnvFilter` directive; `RUST_LOG` still wins when set.
    #[arg(long, env = "PRISM_LOG")]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, env = "PRISM_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Per-subscriber buffer of the live event stream.
    #[arg(long, env = "PRISM_EVENT_CAPACITY")]
    pub event_capacity: Option<usize>,

    /// Recent events kept per ledger.
    #[arg(long, env = "PRISM_JOURNAL_CAPACITY")]
    pub journal_capacity: Option<usize>,
}
