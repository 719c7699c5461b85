use std::path::PathBuf;
use std::time::Duration;

use eventsource_log::{LogBackend, LogConfig};
use serde::{Deserialize, Serialize};

/// Default host for the eventsource server
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port for the eventsource server
pub const DEFAULT_PORT: u16 = 3000;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfig {
    #[serde(default)]
    pub server: RawServerConfig,

    #[serde(default)]
    pub log: RawLogConfig,
}

/// Server config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerConfig {
    pub host: Option<String>,

    pub port: Option<u16>,

    /// Interval between SSE keep-alive comments, e.g. "15s"
    #[serde(default, with = "humantime_serde")]
    pub keep_alive: Option<Duration>,

    /// Stored events fetched per page during historic replay
    pub replay_batch_size: Option<usize>,
}

/// Log config as stored in TOML
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawLogConfig {
    pub backend: Option<LogBackend>,

    pub database_path: Option<PathBuf>,

    pub sequence_key: Option<String>,

    pub channel_capacity: Option<usize>,

    /// How often to look for events from other processes, e.g. "250ms"
    #[serde(default, with = "humantime_serde")]
    pub poll_interval: Option<Duration>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventSourceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to, and to reach the server at
    pub host: String,

    /// Port for the eventsource server
    pub port: u16,

    /// Interval between SSE keep-alive comments
    #[serde(with = "humantime_serde")]
    pub keep_alive: Duration,

    /// Stored events fetched per page during historic replay
    pub replay_batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            keep_alive: eventsource_server::DEFAULT_KEEP_ALIVE,
            replay_batch_size: eventsource_core::DEFAULT_BATCH_SIZE,
        }
    }
}

impl ServerConfig {
    /// Base URL clients use to reach the server
    pub fn base_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" => "127.0.0.1",
            "::" | "[::]" => "[::1]",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }
}
