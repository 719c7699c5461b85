//! Id assignment, durable append and broadcast of new events.

use std::sync::Arc;

use eventsource_log::{Broadcaster, EventStore, SequenceAllocator};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::PublishError;
use crate::event::{Event, PING};

/// Creates events and makes them visible, storage first.
///
/// A subscriber that receives an event from the broadcaster can rely on that
/// event already being returned by the store.
#[derive(Clone)]
pub struct EventPublisher {
    allocator: Arc<dyn SequenceAllocator>,
    store: Arc<dyn EventStore<Event>>,
    broadcaster: Arc<dyn Broadcaster<Event>>,
}

impl EventPublisher {
    pub fn new(
        allocator: Arc<dyn SequenceAllocator>,
        store: Arc<dyn EventStore<Event>>,
        broadcaster: Arc<dyn Broadcaster<Event>>,
    ) -> Self {
        Self {
            allocator,
            store,
            broadcaster,
        }
    }

    /// Allocate an id, store the event, then broadcast it.
    ///
    /// A storage failure leaves a permanent gap at the allocated id and the
    /// event is not broadcast. A broadcast failure still leaves the event
    /// stored; the error carries it.
    pub async fn publish(
        &self,
        kind: impl Into<String>,
        payload: Value,
    ) -> Result<Event, PublishError> {
        let kind = kind.into();

        let id = self.allocator.next_id().await.map_err(|e| {
            error!(event_type = %kind, error = %e, "Event id allocation failed");
            PublishError::Allocation(e)
        })?;

        let event = Event::new(id, kind, payload);

        if let Err(e) = self.store.append(&event).await {
            error!(
                event_id = id,
                event_type = %event.kind,
                error = %e,
                "Failed to store event, id is lost"
            );
            return Err(PublishError::Storage { id, source: e });
        }

        match self.broadcaster.publish(&event).await {
            Ok(reached) => {
                debug!(event_id = id, event_type = %event.kind, reached, "Published event");
                Ok(event)
            }
            Err(e) => {
                warn!(
                    event_id = id,
                    event_type = %event.kind,
                    error = %e,
                    "Event stored but broadcast failed"
                );
                Err(PublishError::Broadcast {
                    event: Box::new(event),
                    source: e,
                })
            }
        }
    }

    /// Publish a `Ping` event with an empty payload.
    pub async fn ping(&self) -> Result<Event, PublishError> {
        self.publish(PING, Value::Object(Default::default())).await
    }
}
