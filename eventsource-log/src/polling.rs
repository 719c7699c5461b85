//! Broadcaster that tails a shared store.
//!
//! Every subscription keeps its own cursor into the store and reads whatever
//! was appended past it, no matter which process appended it. A local
//! `publish` only wakes the subscriptions of this process early; events from
//! other processes are picked up on the next poll.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::traits::{Broadcaster, EventId, EventStore, Sequenced, Subscription};

/// Events read from the store per poll.
const POLL_BATCH: usize = 256;

/// Live feed over an [`EventStore`] that several processes append to.
pub struct PollingBroadcaster<E> {
    store: Arc<dyn EventStore<E>>,
    wake: Arc<Notify>,
    active: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    poll_interval: Duration,
}

impl<E> PollingBroadcaster<E>
where
    E: Sequenced + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(store: Arc<dyn EventStore<E>>, poll_interval: Duration) -> Self {
        Self {
            store,
            wake: Arc::new(Notify::new()),
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
            poll_interval,
        }
    }
}

#[async_trait]
impl<E> Broadcaster<E> for PollingBroadcaster<E>
where
    E: Sequenced + Send + Sync + 'static,
{
    /// The event is already in the store; wake local subscribers so they
    /// read it without waiting for the next poll.
    async fn publish(&self, event: &E) -> Result<usize> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Closed);
        }
        self.wake.notify_waiters();
        trace!(event_id = event.sequence(), "Woke local subscribers");
        Ok(self.subscriber_count())
    }

    async fn subscribe(&self) -> Result<Box<dyn Subscription<E>>> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Closed);
        }
        let cursor = self.store.last_id().await?;
        let count = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(subscribers = count, cursor, "Polling subscription opened");

        Ok(Box::new(PollingSubscription {
            store: Arc::clone(&self.store),
            wake: Arc::clone(&self.wake),
            active: Some(Arc::clone(&self.active)),
            shutdown: self.shutdown.clone(),
            poll_interval: self.poll_interval,
            cursor,
            pending: VecDeque::new(),
        }))
    }

    fn subscriber_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        debug!(
            subscribers = self.subscriber_count(),
            "Shutting down polling broadcaster"
        );
        self.shutdown.cancel();
    }
}

struct PollingSubscription<E> {
    store: Arc<dyn EventStore<E>>,
    wake: Arc<Notify>,
    /// `None` once released.
    active: Option<Arc<AtomicUsize>>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    /// Highest id handed to `pending`.
    cursor: EventId,
    pending: VecDeque<E>,
}

#[async_trait]
impl<E> Subscription<E> for PollingSubscription<E>
where
    E: Sequenced + Send + Sync + 'static,
{
    async fn next(&mut self) -> Result<Option<E>> {
        loop {
            if self.active.is_none() {
                return Ok(None);
            }
            if self.shutdown.is_cancelled() {
                self.unsubscribe();
                return Ok(None);
            }
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            // Register for a wake-up before reading, so a publish landing
            // between the read and the wait is not missed.
            let wake = Arc::clone(&self.wake);
            let woken = wake.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();

            let page = self.store.query_from(self.cursor, POLL_BATCH).await?;
            if let Some(last) = page.last() {
                self.cursor = last.sequence();
                trace!(count = page.len(), cursor = self.cursor, "Polled store");
                self.pending.extend(page);
                continue;
            }

            let shutdown = self.shutdown.clone();
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = &mut woken => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    fn unsubscribe(&mut self) {
        if let Some(active) = self.active.take() {
            let remaining = active.fetch_sub(1, Ordering::SeqCst) - 1;
            self.pending.clear();
            debug!(subscribers = remaining, "Polling subscription released");
        }
    }

    fn is_released(&self) -> bool {
        self.active.is_none()
    }
}

impl<E> Drop for PollingSubscription<E> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
