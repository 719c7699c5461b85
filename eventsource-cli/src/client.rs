//! HTTP client for a running eventsource server.
//!
//! Used by the `trigger`, `publish` and `tail` commands.

use anyhow::{Context, Result};
use eventsource_core::{Event, EventId};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Result of a publish request
#[derive(Debug)]
pub enum Published {
    /// Stored and broadcast
    Delivered(Event),
    /// Stored, but live subscribers were not notified
    StoredOnly { event: Event, warning: String },
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PartialPublish {
    event: Event,
    warning: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Which stream endpoint to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Historic,
    Live,
    Replay,
}

impl StreamKind {
    fn path(self) -> &'static str {
        match self {
            Self::Historic => "/sse/historic",
            Self::Live => "/sse/live",
            Self::Replay => "/sse/replay",
        }
    }
}

pub struct EventSourceClient {
    client: Client,
    base_url: String,
}

impl EventSourceClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Publish a `Ping` through the trigger endpoint
    pub async fn trigger(&self) -> Result<Published> {
        let url = format!("{}/triggerEvent", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", self.base_url))?;

        Self::published(response).await
    }

    /// Publish an event with the given type and payload
    pub async fn publish(&self, kind: &str, payload: &serde_json::Value) -> Result<Published> {
        let url = format!("{}/api/events", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&PublishRequest { kind, payload })
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", self.base_url))?;

        Self::published(response).await
    }

    /// Open a stream, resuming after `last_event_id` when given
    pub async fn stream(
        &self,
        kind: StreamKind,
        last_event_id: Option<EventId>,
    ) -> Result<EventReader> {
        let url = format!("{}{}", self.base_url, kind.path());
        let mut request = self.client.get(&url);
        if let Some(id) = last_event_id {
            request = request.header("Last-Event-ID", id.to_string());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", self.base_url))?;
        let response = Self::check(response).await?;

        Ok(EventReader {
            response,
            buffer: Vec::new(),
        })
    }

    async fn published(response: Response) -> Result<Published> {
        if response.status() == StatusCode::ACCEPTED {
            let partial: PartialPublish = response
                .json()
                .await
                .context("Failed to parse publish response")?;
            return Ok(Published::StoredOnly {
                event: partial.event,
                warning: partial.warning,
            });
        }

        let event = Self::check(response)
            .await?
            .json()
            .await
            .context("Failed to parse published event")?;
        Ok(Published::Delivered(event))
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        anyhow::bail!("Server returned {}: {}", status, message)
    }
}

/// Reads events off an SSE response body
pub struct EventReader {
    response: Response,
    buffer: Vec<u8>,
}

impl EventReader {
    /// Next event, or None once the server ends the stream
    pub async fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            while let Some(frame) = take_frame(&mut self.buffer) {
                if let Some(data) = frame_data(&frame) {
                    let event = serde_json::from_str(&data)
                        .with_context(|| format!("Malformed event data: {}", data))?;
                    return Ok(Some(event));
                }
            }

            match self.response.chunk().await.context("Stream interrupted")? {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => return Ok(None),
            }
        }
    }
}

/// Split the first complete frame off `buffer`
fn take_frame(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let raw: Vec<u8> = buffer.drain(..end + 2).collect();
    Some(String::from_utf8_lossy(&raw).into_owned())
}

/// Joined `data:` lines of a frame; None for comment-only frames
fn frame_data(frame: &str) -> Option<String> {
    let lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
