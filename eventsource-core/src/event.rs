//! The event record stored in and streamed from the log.

use chrono::{DateTime, Utc};
use eventsource_log::{EventId, Sequenced};
use serde::{Deserialize, Serialize};

/// Type name of the heartbeat event published by the trigger endpoint.
pub const PING: &str = "Ping";

/// An immutable entry of the append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the log, unique and strictly increasing.
    pub id: EventId,
    /// Event type name, e.g. `"Ping"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary structured data.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(id: EventId, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id,
            kind: kind.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

impl Sequenced for Event {
    fn sequence(&self) -> EventId {
        self.id
    }

    fn kind(&self) -> Option<&str> {
        Some(&self.kind)
    }
}
