use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod config;

#[derive(Parser)]
#[command(
    name = "eventsource",
    about = "Append-only event log streamed to browsers over SSE"
)]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Publish an event with a JSON payload
    Publish(commands::trigger::PublishArgs),
    /// Run the eventsource server
    Serve(commands::serve::ServeArgs),
    /// Print events from a running server
    Tail(commands::tail::TailArgs),
    /// Publish a Ping event
    Trigger(commands::trigger::TriggerArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Publish(args) => commands::trigger::run_publish(args).await,
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Tail(args) => commands::tail::run(args).await,
        Commands::Trigger(args) => commands::trigger::run_trigger(args).await,
    }
}
