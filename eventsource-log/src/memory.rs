//! In-memory backends.
//!
//! Nothing here survives a restart. The store and allocator are useful for
//! tests and single-process development; the broadcaster is the live channel
//! used in every deployment, since broadcast is best-effort by contract.
//!
//! Each backend can be switched off with `set_available(false)` to exercise
//! the error paths of the code above it.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::traits::{Broadcaster, EventId, EventStore, SequenceAllocator, Sequenced, Subscription};

/// Process-local sequence counter.
pub struct InMemorySequenceAllocator {
    last: AtomicU64,
    available: AtomicBool,
}

impl InMemorySequenceAllocator {
    /// Create an allocator whose first id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// Create an allocator whose first id is `last + 1`.
    #[must_use]
    pub fn starting_after(last: EventId) -> Self {
        Self {
            last: AtomicU64::new(last),
            available: AtomicBool::new(true),
        }
    }

    /// The most recently allocated id (0 if none).
    pub fn current(&self) -> EventId {
        self.last.load(Ordering::SeqCst)
    }

    /// Simulate the counter service going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for InMemorySequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SequenceAllocator for InMemorySequenceAllocator {
    async fn next_id(&self) -> Result<EventId> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("sequence allocator"));
        }
        Ok(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Event store backed by an ordered map.
pub struct InMemoryEventStore<E> {
    events: RwLock<BTreeMap<EventId, E>>,
    available: AtomicBool,
}

impl<E> InMemoryEventStore<E>
where
    E: Sequenced + Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Simulate the store becoming unreachable or reachable again.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Unavailable("event store"))
        }
    }
}

impl<E> Default for InMemoryEventStore<E>
where
    E: Sequenced + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> EventStore<E> for InMemoryEventStore<E>
where
    E: Sequenced + Clone + Send + Sync + 'static,
{
    async fn append(&self, event: &E) -> Result<()> {
        self.check_available()?;
        let id = event.sequence();
        let mut events = self.events.write().await;
        if events.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        events.insert(id, event.clone());
        Ok(())
    }

    async fn query_from(&self, after: EventId, limit: usize) -> Result<Vec<E>> {
        self.check_available()?;
        let events = self.events.read().await;
        Ok(events
            .range((Bound::Excluded(after), Bound::Unbounded))
            .take(limit)
            .map(|(_, event)| event.clone())
            .collect())
    }

    async fn last_id(&self) -> Result<EventId> {
        self.check_available()?;
        Ok(self.events.read().await.keys().next_back().copied().unwrap_or(0))
    }
}

/// Live fan-out over a tokio broadcast channel.
pub struct InMemoryBroadcaster<E> {
    tx: broadcast::Sender<E>,
    active: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    available: AtomicBool,
}

impl<E> InMemoryBroadcaster<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Create a broadcaster whose subscribers may fall `capacity` events behind.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the channel becoming unreachable or reachable again.
    ///
    /// Affects `publish` and `subscribe`; feeds already open keep running.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_open(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Closed);
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("broadcaster"));
        }
        Ok(())
    }
}

#[async_trait]
impl<E> Broadcaster<E> for InMemoryBroadcaster<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn publish(&self, event: &E) -> Result<usize> {
        self.check_open()?;
        // No receivers is not an error: nobody is tailing right now.
        let reached = self.tx.send(event.clone()).unwrap_or(0);
        trace!(reached, "Broadcast event");
        Ok(reached)
    }

    async fn subscribe(&self) -> Result<Box<dyn Subscription<E>>> {
        self.check_open()?;
        let rx = self.tx.subscribe();
        let count = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(subscribers = count, "Subscription opened");
        Ok(Box::new(InMemorySubscription {
            rx: Some(rx),
            active: Arc::clone(&self.active),
            shutdown: self.shutdown.clone(),
        }))
    }

    fn subscriber_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        debug!(
            subscribers = self.subscriber_count(),
            "Shutting down broadcaster"
        );
        self.shutdown.cancel();
    }
}

/// Receiving end of an [`InMemoryBroadcaster`].
struct InMemorySubscription<E> {
    rx: Option<broadcast::Receiver<E>>,
    active: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

#[async_trait]
impl<E> Subscription<E> for InMemorySubscription<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn next(&mut self) -> Result<Option<E>> {
        let shutdown = self.shutdown.clone();
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };

        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            msg = rx.recv() => Some(msg),
        };

        match received {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(RecvError::Lagged(count))) => Err(Error::Lagged(count)),
            Some(Err(RecvError::Closed)) | None => {
                self.unsubscribe();
                Ok(None)
            }
        }
    }

    fn unsubscribe(&mut self) {
        if self.rx.take().is_some() {
            let remaining = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
            debug!(subscribers = remaining, "Subscription released");
        }
    }

    fn is_released(&self) -> bool {
        self.rx.is_none()
    }
}

impl<E> Drop for InMemorySubscription<E> {
    fn drop(&mut self) {
        if self.rx.take().is_some() {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
