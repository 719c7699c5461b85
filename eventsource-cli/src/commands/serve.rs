//! Serve command for running the eventsource server
//!
//! Opens the configured event log and serves it over HTTP until Ctrl-C or
//! SIGTERM.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use eventsource_core::EventLog;
use eventsource_log::LogBackend;
use eventsource_server::{EventSourceServer, ServerConfig};
use humantime_serde::re::humantime;
use tracing::info;

use crate::config::{ConfigLoader, EventSourceConfig};

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Keep events in memory only (nothing survives a restart)
    #[arg(long, conflicts_with = "database")]
    pub memory: bool,

    /// SQLite database file for the event log
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Interval between SSE keep-alive comments (e.g. "15s")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub keep_alive: Option<Duration>,

    /// Stored events fetched per page during historic replay
    #[arg(long)]
    pub batch_size: Option<usize>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let mut config = ConfigLoader::load()?;
    apply_overrides(&args, &mut config);

    info!(
        host = %config.server.host,
        port = config.server.port,
        backend = config.log.backend.as_str(),
        "Starting eventsource server"
    );

    let log = EventLog::open(&config.log).context("Failed to open event log")?;
    let server_config = ServerConfig {
        host: config.server.host,
        port: config.server.port,
        keep_alive: config.server.keep_alive,
        replay_batch_size: config.server.replay_batch_size,
    };

    EventSourceServer::new(server_config, &log)
        .run()
        .await
        .map_err(Into::into)
}

/// Command-line flags win over every config file
fn apply_overrides(args: &ServeArgs, config: &mut EventSourceConfig) {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(keep_alive) = args.keep_alive {
        config.server.keep_alive = keep_alive;
    }
    if let Some(batch_size) = args.batch_size {
        config.server.replay_batch_size = batch_size;
    }
    if args.memory {
        config.log.backend = LogBackend::Memory;
    }
    if let Some(path) = &args.database {
        config.log.backend = LogBackend::Sqlite;
        config.log.database_path = path.clone();
    }
}
