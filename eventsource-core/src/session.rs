//! Per-connection stream lifecycle.
//!
//! A [`StreamSession`] pulls from a [`ReplayStream`] and pushes each event
//! into an [`EventSink`] until the stream ends, the client goes away or the
//! process shuts down. Whatever the reason, the live subscription is
//! released exactly once when the session returns.

use async_trait::async_trait;
use eventsource_log::EventId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StreamError;
use crate::event::Event;
use crate::replay::{ReplayCoordinator, ReplayStream};

/// The client connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client connection closed")]
pub struct SinkClosed;

/// Transport side of a session: frames and writes events to one client.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Write one event.
    async fn send(&mut self, event: &Event) -> Result<(), SinkClosed>;

    /// Resolves once the client has disconnected.
    async fn closed(&self);
}

/// Sink feeding a channel whose receiver is the response body.
///
/// Dropping the receiver (the transport gave up on the connection) is how a
/// disconnect shows up here.
pub struct ChannelSink<T, F> {
    tx: mpsc::Sender<T>,
    frame: F,
}

impl<T, F> ChannelSink<T, F>
where
    T: Send + 'static,
    F: Fn(&Event) -> T + Send + Sync + 'static,
{
    pub fn new(tx: mpsc::Sender<T>, frame: F) -> Self {
        Self { tx, frame }
    }
}

#[async_trait]
impl<T, F> EventSink for ChannelSink<T, F>
where
    T: Send + 'static,
    F: Fn(&Event) -> T + Send + Sync + 'static,
{
    async fn send(&mut self, event: &Event) -> Result<(), SinkClosed> {
        let frame = (self.frame)(event);
        self.tx.send(frame).await.map_err(|_| SinkClosed)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Which kind of stream a client asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Stored events after the token, then live events.
    Merged(Option<EventId>),
    /// Live events only.
    Live,
    /// Stored events after the token, then end.
    Replay(Option<EventId>),
}

impl StreamMode {
    pub fn resume_token(&self) -> Option<EventId> {
        match self {
            Self::Merged(token) | Self::Replay(token) => *token,
            Self::Live => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merged(_) => "merged",
            Self::Live => "live",
            Self::Replay(_) => "replay",
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// A bounded replay delivered everything, or the live feed closed.
    Completed,
    /// The client went away.
    Disconnected,
    /// The process is shutting down.
    Cancelled,
    /// Storage or broadcast failed; the client should reconnect with the
    /// last id it received.
    Failed(StreamError),
}

/// One client's stream.
pub struct StreamSession<S> {
    id: Uuid,
    mode: StreamMode,
    stream: ReplayStream,
    sink: S,
    cancel: CancellationToken,
    delivered: u64,
    last_delivered: Option<EventId>,
}

impl<S: EventSink> StreamSession<S> {
    /// Open the stream for `mode` and bind it to `sink`.
    ///
    /// Merged and live modes subscribe here, so a broadcaster failure is
    /// reported before anything is written to the client.
    pub async fn open(
        coordinator: &ReplayCoordinator,
        mode: StreamMode,
        sink: S,
        cancel: CancellationToken,
    ) -> Result<Self, StreamError> {
        let stream = match mode {
            StreamMode::Merged(token) => coordinator.stream(token).await?,
            StreamMode::Live => coordinator.live().await?,
            StreamMode::Replay(after) => coordinator.replay(after),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            mode,
            stream,
            sink,
            cancel,
            delivered: 0,
            last_delivered: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Drive the stream into the sink until something ends the session.
    pub async fn run(mut self) -> SessionOutcome {
        info!(
            session = %self.id,
            mode = self.mode.as_str(),
            resume = ?self.mode.resume_token(),
            "Stream session started"
        );

        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break SessionOutcome::Cancelled,
                _ = self.sink.closed() => break SessionOutcome::Disconnected,
                next = self.stream.next() => next,
            };

            let event = match next {
                Ok(Some(event)) => event,
                Ok(None) => break SessionOutcome::Completed,
                Err(e) => break SessionOutcome::Failed(e),
            };

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                sent = self.sink.send(&event) => Some(sent),
            };

            match sent {
                Some(Ok(())) => {
                    self.delivered += 1;
                    self.last_delivered = Some(event.id);
                    debug!(session = %self.id, event_id = event.id, "Delivered event");
                }
                Some(Err(SinkClosed)) => break SessionOutcome::Disconnected,
                None => break SessionOutcome::Cancelled,
            }
        };

        self.stream.close();

        match &outcome {
            SessionOutcome::Failed(e) => warn!(
                session = %self.id,
                delivered = self.delivered,
                last_event_id = ?self.last_delivered,
                error = %e,
                "Stream session failed"
            ),
            other => info!(
                session = %self.id,
                delivered = self.delivered,
                last_event_id = ?self.last_delivered,
                outcome = ?other,
                "Stream session ended"
            ),
        }

        outcome
    }
}
