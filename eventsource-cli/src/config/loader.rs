use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use eventsource_log::LogConfig;

use super::types::{
    DEFAULT_HOST, DEFAULT_PORT, EventSourceConfig, RawConfig, RawLogConfig, RawServerConfig,
    ServerConfig,
};

/// Env var overriding the project config directory
pub const PROJECT_CONFIG_DIR_ENV: &str = "EVENTSOURCE_PROJECT_CONFIG_DIR";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<EventSourceConfig> {
        let mut layers = Vec::new();
        if let Some(user_path) = Self::user_config_path() {
            layers.push(user_path);
        }
        layers.push(Self::project_config_path());

        Self::load_layers(&layers)
    }

    /// Merge the files at `paths` in order, later files winning.
    /// Missing files are skipped.
    pub fn load_layers(paths: &[PathBuf]) -> Result<EventSourceConfig> {
        let mut raw = RawConfig::default();

        for path in paths {
            if let Some(layer) = Self::read_raw(path)? {
                tracing::debug!(path = %path.display(), "Loaded config layer");
                raw = Self::merge_raw(raw, layer);
            }
        }

        Ok(Self::finalize(raw))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "eventsource").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with EVENTSOURCE_PROJECT_CONFIG_DIR (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var(PROJECT_CONFIG_DIR_ENV) {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".eventsource/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<Option<RawConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(raw))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawConfig, overlay: RawConfig) -> RawConfig {
        RawConfig {
            server: RawServerConfig {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
                keep_alive: overlay.server.keep_alive.or(base.server.keep_alive),
                replay_batch_size: overlay
                    .server
                    .replay_batch_size
                    .or(base.server.replay_batch_size),
            },
            log: RawLogConfig {
                backend: overlay.log.backend.or(base.log.backend),
                database_path: overlay.log.database_path.or(base.log.database_path),
                sequence_key: overlay.log.sequence_key.or(base.log.sequence_key),
                channel_capacity: overlay.log.channel_capacity.or(base.log.channel_capacity),
                poll_interval: overlay.log.poll_interval.or(base.log.poll_interval),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawConfig) -> EventSourceConfig {
        let server_defaults = ServerConfig::default();
        let log_defaults = LogConfig::default();

        EventSourceConfig {
            server: ServerConfig {
                host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
                keep_alive: raw.server.keep_alive.unwrap_or(server_defaults.keep_alive),
                replay_batch_size: raw
                    .server
                    .replay_batch_size
                    .unwrap_or(server_defaults.replay_batch_size),
            },
            log: LogConfig {
                backend: raw.log.backend.unwrap_or(log_defaults.backend),
                database_path: raw.log.database_path.unwrap_or(log_defaults.database_path),
                sequence_key: raw.log.sequence_key.unwrap_or(log_defaults.sequence_key),
                channel_capacity: raw
                    .log
                    .channel_capacity
                    .unwrap_or(log_defaults.channel_capacity),
                poll_interval: raw.log.poll_interval.unwrap_or(log_defaults.poll_interval),
            },
        }
    }
}
