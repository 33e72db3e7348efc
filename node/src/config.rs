//! # Node Configuration
//!
//! TOML configuration for `prism-node`. Every section and field has a
//! default, so a missing file, an empty file and a file that sets only a few
//! keys are all valid. CLI flags are applied on top by [`NodeConfig::apply_overrides`].
//!
//! ```toml
//! [api]
//! listen = "0.0.0.0:9741"
//! cors = true
//!
//! [metrics]
//! enabled = true
//! listen = "0.0.0.0:9742"
//!
//! [logging]
//! level = "prism_node=info,prism_contracts=info,tower_http=info"
//! format = "pretty"
//!
//! [events]
//! capacity = 256
//! journal_capacity = 1024
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use prism_contracts::config::{DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_JOURNAL_CAPACITY};

use crate::cli::RunArgs;
use crate::logging::LogFormat;

const DEFAULT_API_PORT: u16 = 9741;
const DEFAULT_METRICS_PORT: u16 = 9742;
const DEFAULT_LOG_LEVEL: &str = "prism_node=info,prism_contracts=info,tower_http=info";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address the HTTP/WS API binds to.
    pub listen: SocketAddr,
    /// Attach a permissive CORS layer to the router.
    pub cors: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Address of the separate Prometheus listener.
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast buffer per WebSocket subscriber. Slow readers past this
    /// many events start losing the oldest ones.
    pub capacity: usize,
    /// Recent events each ledger keeps in memory. Older ones are dropped.
    pub journal_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_API_PORT)),
            cors: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_METRICS_PORT)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.into(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Reads `path` when given, otherwise starts from the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render config as TOML")
    }

    /// Applies the flags given on the command line. Flags that were not
    /// passed leave the file value untouched.
    pub fn apply_overrides(&mut self, args: &RunArgs) {
        if let Some(listen) = args.listen {
            self.api.listen = listen;
        }
        if let Some(listen) = args.metrics_listen {
            self.metrics.listen = listen;
        }
        if args.no_metrics {
            self.metrics.enabled = false;
        }
        if args.no_cors {
            self.api.cors = false;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = args.log_format {
            self.logging.format = format;
        }
        if let Some(capacity) = args.event_capacity {
            self.events.capacity = capacity;
        }
        if let Some(capacity) = args.journal_capacity {
            self.events.journal_capacity = capacity;
        }
        // A zero-capacity broadcast channel panics on creation.
        self.events.capacity = self.events.capacity.max(1);
    }
}
