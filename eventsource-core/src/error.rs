//! Error types for eventsource-core

use eventsource_log::{Error as LogError, EventId};
use thiserror::Error;

use crate::event::Event;

/// Failure of [`EventPublisher::publish`](crate::EventPublisher::publish).
#[derive(Error, Debug)]
pub enum PublishError {
    /// No id could be allocated. Nothing was stored or broadcast.
    #[error("failed to allocate event id: {0}")]
    Allocation(#[source] LogError),

    /// The id was allocated but the event could not be stored. The id is
    /// consumed and will never appear in the log.
    #[error("failed to store event {id}: {source}")]
    Storage {
        id: EventId,
        #[source]
        source: LogError,
    },

    /// The event is durably stored but live subscribers were not notified.
    /// Replay will still deliver it.
    #[error("event {} stored but not broadcast: {source}", .event.id)]
    Broadcast {
        event: Box<Event>,
        #[source]
        source: LogError,
    },
}

impl PublishError {
    /// The stored event, when the failure happened after the durable append.
    pub fn stored_event(&self) -> Option<&Event> {
        match self {
            Self::Broadcast { event, .. } => Some(event.as_ref()),
            _ => None,
        }
    }
}

/// Failure that ends a replay stream. Reconnecting with the last delivered
/// id as resume token continues without loss.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("historic replay failed: {0}")]
    Storage(#[source] LogError),

    #[error("live feed failed: {0}")]
    Broadcast(#[source] LogError),
}
