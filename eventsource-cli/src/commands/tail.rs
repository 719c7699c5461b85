//! Tail command: print events from a running server as they arrive.

use anyhow::Result;
use clap::Args;
use eventsource_core::EventId;
use tracing::debug;

use crate::client::{EventSourceClient, StreamKind};
use crate::commands::trigger::server_url;

/// Arguments for the tail command
#[derive(Debug, Args)]
pub struct TailArgs {
    /// Resume after this event id (replays everything stored after it)
    #[arg(long, value_name = "ID")]
    pub after: Option<EventId>,

    /// Only new events, no history
    #[arg(long, conflicts_with_all = ["after", "replay"])]
    pub live: bool,

    /// Print stored events and exit instead of following
    #[arg(long)]
    pub replay: bool,

    /// Server URL (defaults to the configured host and port)
    #[arg(long)]
    pub url: Option<String>,
}

impl TailArgs {
    fn stream_kind(&self) -> StreamKind {
        if self.live {
            StreamKind::Live
        } else if self.replay {
            StreamKind::Replay
        } else {
            StreamKind::Historic
        }
    }

    /// Replay of the whole log starts after id 0
    fn resume_token(&self) -> Option<EventId> {
        match self.stream_kind() {
            StreamKind::Live => None,
            _ => Some(self.after.unwrap_or(0)),
        }
    }
}

/// Run the tail command
pub async fn run(args: TailArgs) -> Result<()> {
    let client = EventSourceClient::new(server_url(args.url.clone())?);
    let kind = args.stream_kind();
    let mut reader = client.stream(kind, args.resume_token()).await?;
    debug!(?kind, after = ?args.resume_token(), "Stream opened");

    while let Some(event) = reader.next_event().await? {
        println!("{}", serde_json::to_string(&event)?);
    }

    debug!("Stream ended");
    Ok(())
}
