//! Core traits for the log's collaborators.

use async_trait::async_trait;

/// Identifier of an event in the log.
///
/// Ids start at 1 and only ever grow. `0` is never assigned, so querying
/// "after 0" reads the log from the beginning.
pub type EventId = u64;

/// Trait for events that carry their position in the log.
pub trait Sequenced {
    /// The id assigned to this event.
    fn sequence(&self) -> EventId;

    /// Short type name stored alongside the event, if any.
    fn kind(&self) -> Option<&str> {
        None
    }
}

/// Source of strictly increasing event ids shared by every producer.
#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// Advance the counter and return the new value.
    ///
    /// An id returned here is consumed even if the caller never stores an
    /// event under it.
    async fn next_id(&self) -> crate::Result<EventId>;
}

/// Durable, ordered storage for events.
#[async_trait]
pub trait EventStore<E>: Send + Sync {
    /// Append an event. Fails with [`Error::DuplicateId`](crate::Error::DuplicateId)
    /// if an event with the same id is already stored.
    async fn append(&self, event: &E) -> crate::Result<()>;

    /// Events with id strictly greater than `after`, ascending, at most `limit`.
    async fn query_from(&self, after: EventId, limit: usize) -> crate::Result<Vec<E>>;

    /// Highest stored id, `0` when the store is empty.
    async fn last_id(&self) -> crate::Result<EventId>;
}

/// Best-effort fan-out of events to live subscribers.
///
/// Nothing is persisted or replayed: a subscriber only sees events published
/// after it subscribed.
#[async_trait]
pub trait Broadcaster<E>: Send + Sync {
    /// Publish an event, returning how many subscribers it reached.
    async fn publish(&self, event: &E) -> crate::Result<usize>;

    /// Open a live feed of events published from now on.
    async fn subscribe(&self) -> crate::Result<Box<dyn Subscription<E>>>;

    /// Number of subscriptions currently held open.
    fn subscriber_count(&self) -> usize;

    /// Release every subscription. Later calls to `subscribe` fail.
    async fn shutdown(&self);
}

/// A live feed handed out by a [`Broadcaster`].
#[async_trait]
pub trait Subscription<E>: Send {
    /// Wait for the next event. `Ok(None)` means the feed was closed.
    async fn next(&mut self) -> crate::Result<Option<E>>;

    /// Release the subscription. Calling it more than once is harmless, and
    /// dropping the subscription releases it as well.
    fn unsubscribe(&mut self);

    /// Whether `unsubscribe` has already run.
    fn is_released(&self) -> bool;
}
