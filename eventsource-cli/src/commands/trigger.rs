//! Trigger and publish commands for writing into a running server's log.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Args;

use crate::client::{EventSourceClient, Published};
use crate::config::ConfigLoader;

/// Arguments for the trigger command
#[derive(Debug, Args)]
pub struct TriggerArgs {
    /// Server URL (defaults to the configured host and port)
    #[arg(long)]
    pub url: Option<String>,
}

/// Arguments for the publish command
#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Event type, e.g. "OrderPlaced"
    #[arg(value_name = "TYPE")]
    pub kind: String,

    /// Event payload as JSON (reads from stdin if omitted)
    #[arg(short, long)]
    pub data: Option<String>,

    /// Server URL (defaults to the configured host and port)
    #[arg(long)]
    pub url: Option<String>,
}

/// Publish a Ping event
pub async fn run_trigger(args: TriggerArgs) -> Result<()> {
    let client = EventSourceClient::new(server_url(args.url)?);
    report(client.trigger().await?)
}

/// Publish an event with a payload
pub async fn run_publish(args: PublishArgs) -> Result<()> {
    let raw = match args.data {
        Some(data) => data,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };
    let payload = parse_payload(&raw)?;

    let client = EventSourceClient::new(server_url(args.url)?);
    report(client.publish(&args.kind, &payload).await?)
}

/// Explicit URL, or the configured server address
pub(crate) fn server_url(url: Option<String>) -> Result<String> {
    match url {
        Some(url) => Ok(url),
        None => Ok(ConfigLoader::load()?.server.base_url()),
    }
}

/// Empty input means an empty object payload
fn parse_payload(raw: &str) -> Result<serde_json::Value> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(Default::default()));
    }
    serde_json::from_str(raw).context("Payload is not valid JSON")
}

fn report(published: Published) -> Result<()> {
    match published {
        Published::Delivered(event) => {
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        Published::StoredOnly { event, warning } => {
            println!("{}", serde_json::to_string_pretty(&event)?);
            eprintln!("Warning: {}", warning);
        }
    }
    Ok(())
}
