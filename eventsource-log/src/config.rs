//! Configuration for the log backends.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which implementation backs the allocator and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBackend {
    /// Process-local, nothing survives a restart.
    Memory,
    /// SQLite database file shared by every process pointing at it.
    #[default]
    Sqlite,
}

impl LogBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Configuration for sequence allocation, storage and broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Backend for the allocator and the event store.
    #[serde(default)]
    pub backend: LogBackend,

    /// SQLite database file (sqlite backend only).
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Name of the counter row the allocator advances.
    #[serde(default = "default_sequence_key")]
    pub sequence_key: String,

    /// Events a live subscriber may fall behind before it is cut off.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How often live subscribers look for events stored by other
    /// processes (sqlite backend only).
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("eventsource").join("events.db"))
        .unwrap_or_else(|| PathBuf::from("/tmp/eventsource/events.db"))
}

fn default_sequence_key() -> String {
    "events.sequence".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(250)
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            backend: LogBackend::default(),
            database_path: default_database_path(),
            sequence_key: default_sequence_key(),
            channel_capacity: default_channel_capacity(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl LogConfig {
    /// Use the in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: LogBackend::Memory,
            ..Self::default()
        }
    }

    /// Use a SQLite database at the given path.
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backend = LogBackend::Sqlite;
        self.database_path = path.into();
        self
    }

    /// Set the broadcast channel capacity.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set how often subscribers poll the shared database.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let config = LogConfig::default();

        assert_eq!(config.backend, LogBackend::Sqlite);
        assert_eq!(config.sequence_key, "events.sequence");
        assert_eq!(config.channel_capacity, 1024);
        assert!(config.database_path.ends_with("events.db"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn config_builder_pattern() {
        let config = LogConfig::in_memory()
            .with_database_path("/var/lib/eventsource/log.db")
            .with_channel_capacity(16);

        assert_eq!(config.backend, LogBackend::Sqlite);
        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/eventsource/log.db")
        );
        assert_eq!(config.channel_capacity, 16);
    }

    #[test]
    fn config_partial_toml_uses_defaults() {
        let config: LogConfig = toml::from_str("backend = \"memory\"").unwrap();

        assert_eq!(config.backend, LogBackend::Memory);
        assert_eq!(config.channel_capacity, 1024);
    }

    #[test]
    fn config_poll_interval_is_humantime() {
        let config: LogConfig = toml::from_str("poll_interval = \"40ms\"").unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(40));

        let rendered = toml::to_string(&config.with_poll_interval(Duration::from_secs(2))).unwrap();
        assert!(rendered.contains("poll_interval = \"2s\""));
    }
}
