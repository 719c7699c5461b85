//! Historic replay spliced onto the live feed.
//!
//! A merged stream opens its live subscription *before* it reads the store.
//! Anything published while the historic pages are drained is buffered by
//! the subscription, so nothing falls between the last stored page and the
//! first live event. The price is that the buffer may repeat events already
//! read from the store; every event is therefore checked against the high
//! watermark (the highest id delivered so far) and only strictly greater ids
//! pass.
//!
//! ```text
//!   subscribe ──► buffer: [5][6][7] ...
//!   query(>3) ──► [4][5][6]            high watermark 6
//!   live      ──►        [5][6][7]     5, 6 dropped; 7 delivered
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use eventsource_log::{Broadcaster, EventId, EventStore, Subscription};
use futures::Stream;
use tracing::{debug, info, trace};

use crate::error::StreamError;
use crate::event::Event;

/// Events requested from the store per page during the historic phase.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Builds merged, live-only and replay-only streams over one store and
/// broadcaster.
#[derive(Clone)]
pub struct ReplayCoordinator {
    store: Arc<dyn EventStore<Event>>,
    broadcaster: Arc<dyn Broadcaster<Event>>,
    batch_size: usize,
}

impl ReplayCoordinator {
    pub fn new(
        store: Arc<dyn EventStore<Event>>,
        broadcaster: Arc<dyn Broadcaster<Event>>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the historic page size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Stream everything after `resume`, then keep tailing.
    ///
    /// With no resume token there is no historic phase: the stream starts at
    /// whatever is published next.
    pub async fn stream(&self, resume: Option<EventId>) -> Result<ReplayStream, StreamError> {
        let live = self
            .broadcaster
            .subscribe()
            .await
            .map_err(StreamError::Broadcast)?;

        let phase = match resume {
            Some(_) => Phase::Historic { drained: false },
            None => Phase::Live,
        };
        debug!(?resume, "Opened merged stream");

        Ok(ReplayStream {
            store: Arc::clone(&self.store),
            live: Some(live),
            phase,
            backlog: VecDeque::new(),
            high_watermark: resume.unwrap_or(0),
            batch_size: self.batch_size,
        })
    }

    /// Tail newly published events only.
    pub async fn live(&self) -> Result<ReplayStream, StreamError> {
        self.stream(None).await
    }

    /// Stream the stored events after `after` (from the start when `None`)
    /// and end once the store is drained. No subscription is opened.
    pub fn replay(&self, after: Option<EventId>) -> ReplayStream {
        ReplayStream {
            store: Arc::clone(&self.store),
            live: None,
            phase: Phase::Historic { drained: false },
            backlog: VecDeque::new(),
            high_watermark: after.unwrap_or(0),
            batch_size: self.batch_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Historic { drained: bool },
    Live,
    Done,
}

/// A single pass over the log. Not restartable: open a new one with the
/// last delivered id to continue.
pub struct ReplayStream {
    store: Arc<dyn EventStore<Event>>,
    live: Option<Box<dyn Subscription<Event>>>,
    phase: Phase,
    backlog: VecDeque<Event>,
    high_watermark: EventId,
    batch_size: usize,
}

impl ReplayStream {
    /// Next event in id order, `Ok(None)` once the stream has ended.
    ///
    /// Any error ends the stream and releases the subscription.
    pub async fn next(&mut self) -> Result<Option<Event>, StreamError> {
        loop {
            match self.phase {
                Phase::Historic { drained } => {
                    if let Some(event) = self.backlog.pop_front() {
                        if self.admit(&event) {
                            return Ok(Some(event));
                        }
                        continue;
                    }

                    if drained {
                        self.enter_live();
                        continue;
                    }

                    let page = match self
                        .store
                        .query_from(self.high_watermark, self.batch_size)
                        .await
                    {
                        Ok(page) => page,
                        Err(e) => {
                            self.close();
                            return Err(StreamError::Storage(e));
                        }
                    };
                    trace!(
                        after = self.high_watermark,
                        count = page.len(),
                        "Read historic page"
                    );

                    self.phase = Phase::Historic {
                        drained: page.len() < self.batch_size,
                    };
                    self.backlog.extend(page);
                }

                Phase::Live => {
                    let Some(live) = self.live.as_mut() else {
                        self.phase = Phase::Done;
                        continue;
                    };

                    match live.next().await {
                        Ok(Some(event)) => {
                            if self.admit(&event) {
                                return Ok(Some(event));
                            }
                            trace!(
                                event_id = event.id,
                                high_watermark = self.high_watermark,
                                "Discarding already delivered event"
                            );
                        }
                        Ok(None) => {
                            debug!("Live feed closed");
                            self.close();
                            return Ok(None);
                        }
                        Err(e) => {
                            self.close();
                            return Err(StreamError::Broadcast(e));
                        }
                    }
                }

                Phase::Done => return Ok(None),
            }
        }
    }

    /// Highest id delivered so far, or the resume token if nothing was.
    pub fn high_watermark(&self) -> EventId {
        self.high_watermark
    }

    /// Whether the historic phase is over and events come from the live feed.
    pub fn is_live(&self) -> bool {
        self.phase == Phase::Live
    }

    /// Whether a live subscription is still held.
    pub fn holds_subscription(&self) -> bool {
        self.live.as_ref().is_some_and(|live| !live.is_released())
    }

    /// End the stream and release the subscription. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut live) = self.live.take() {
            live.unsubscribe();
        }
        self.backlog.clear();
        self.phase = Phase::Done;
    }

    /// Adapt into a [`Stream`] that ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Event, StreamError>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            match stream.next().await {
                Ok(Some(event)) => Some((Ok(event), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }

    fn enter_live(&mut self) {
        if self.live.is_some() {
            info!(
                high_watermark = self.high_watermark,
                "Historic replay drained, switching to live feed"
            );
            self.phase = Phase::Live;
        } else {
            debug!(high_watermark = self.high_watermark, "Replay drained");
            self.phase = Phase::Done;
        }
    }

    fn admit(&mut self, event: &Event) -> bool {
        if event.id > self.high_watermark {
            self.high_watermark = event.id;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use eventsource_log::{Error as LogError, InMemoryBroadcaster, InMemoryEventStore};
    use futures::StreamExt;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;

    fn event(id: EventId) -> Event {
        Event::new(id, "Test", Value::Null)
    }

    async fn store_with(ids: impl IntoIterator<Item = EventId>) -> Arc<InMemoryEventStore<Event>> {
        let store = Arc::new(InMemoryEventStore::<Event>::new());
        for id in ids {
            store.append(&event(id)).await.unwrap();
        }
        store
    }

    async fn take_ids(stream: &mut ReplayStream, n: usize) -> Vec<EventId> {
        let mut ids = vec![];
        for _ in 0..n {
            let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
                .await
                .expect("stream stalled")
                .unwrap()
                .expect("stream ended early");
            ids.push(next.id);
        }
        ids
    }

    /// Broadcaster whose single subscription replays a scripted feed.
    struct ScriptedBroadcaster {
        feed: std::sync::Mutex<Option<mpsc::UnboundedReceiver<Result<Event, LogError>>>>,
    }

    struct ScriptedSubscription {
        rx: Option<mpsc::UnboundedReceiver<Result<Event, LogError>>>,
    }

    #[async_trait]
    impl Broadcaster<Event> for ScriptedBroadcaster {
        async fn publish(&self, _event: &Event) -> eventsource_log::Result<usize> {
            Ok(0)
        }

        async fn subscribe(&self) -> eventsource_log::Result<Box<dyn Subscription<Event>>> {
            let rx = self.feed.lock().unwrap().take();
            Ok(Box::new(ScriptedSubscription { rx }))
        }

        fn subscriber_count(&self) -> usize {
            0
        }

        async fn shutdown(&self) {}
    }

    #[async_trait]
    impl Subscription<Event> for ScriptedSubscription {
        async fn next(&mut self) -> eventsource_log::Result<Option<Event>> {
            match self.rx.as_mut() {
                Some(rx) => rx.recv().await.transpose(),
                None => Ok(None),
            }
        }

        fn unsubscribe(&mut self) {
            self.rx = None;
        }

        fn is_released(&self) -> bool {
            self.rx.is_none()
        }
    }

    fn scripted(
        items: Vec<Result<Event, LogError>>,
    ) -> (
        Arc<ScriptedBroadcaster>,
        mpsc::UnboundedSender<Result<Event, LogError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        for item in items {
            tx.send(item).unwrap();
        }
        (
            Arc::new(ScriptedBroadcaster {
                feed: std::sync::Mutex::new(Some(rx)),
            }),
            tx,
        )
    }

    // ==================== Merged Stream Tests ====================

    #[tokio::test]
    async fn live_duplicates_of_historic_events_are_dropped() {
        let store = store_with(1..=6).await;
        let (broadcaster, _tx) = scripted(vec![Ok(event(5)), Ok(event(6)), Ok(event(7))]);
        let coordinator = ReplayCoordinator::new(store, broadcaster);

        let mut stream = coordinator.stream(Some(3)).await.unwrap();

        assert_eq!(take_ids(&mut stream, 4).await, vec![4, 5, 6, 7]);
        assert!(stream.is_live());
        assert_eq!(stream.high_watermark(), 7);
    }

    #[tokio::test]
    async fn out_of_order_live_events_are_dropped() {
        let store = store_with([]).await;
        let (broadcaster, _tx) =
            scripted(vec![Ok(event(2)), Ok(event(1)), Ok(event(2)), Ok(event(4))]);
        let coordinator = ReplayCoordinator::new(store, broadcaster);

        let mut stream = coordinator.live().await.unwrap();

        assert_eq!(take_ids(&mut stream, 2).await, vec![2, 4]);
    }

    #[tokio::test]
    async fn historic_pages_are_followed_to_the_end() {
        let store = store_with(1..=10).await;
        let (broadcaster, _tx) = scripted(vec![]);
        let coordinator = ReplayCoordinator::new(store, broadcaster).with_batch_size(3);

        let mut stream = coordinator.stream(Some(0)).await.unwrap();

        assert_eq!(take_ids(&mut stream, 10).await, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn resume_at_head_waits_for_next_publish() {
        let store = store_with(1..=3).await;
        let broadcaster = Arc::new(InMemoryBroadcaster::<Event>::new(16));
        let coordinator = ReplayCoordinator::new(store.clone(), broadcaster.clone());

        let mut stream = coordinator.stream(Some(3)).await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(20), stream.next()).await;
        assert!(pending.is_err(), "nothing after 3 yet");

        store.append(&event(4)).await.unwrap();
        broadcaster.publish(&event(4)).await.unwrap();

        assert_eq!(take_ids(&mut stream, 1).await, vec![4]);
    }

    #[tokio::test]
    async fn storage_failure_ends_stream_and_releases_subscription() {
        let store = store_with(1..=3).await;
        store.set_available(false);
        let broadcaster = Arc::new(InMemoryBroadcaster::<Event>::new(16));
        let coordinator = ReplayCoordinator::new(store, broadcaster.clone());

        let mut stream = coordinator.stream(Some(0)).await.unwrap();
        assert_eq!(broadcaster.subscriber_count(), 1);

        assert!(matches!(stream.next().await, Err(StreamError::Storage(_))));
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn live_failure_ends_stream() {
        let store = store_with([]).await;
        let (broadcaster, _tx) = scripted(vec![Ok(event(1)), Err(LogError::Lagged(4))]);
        let coordinator = ReplayCoordinator::new(store, broadcaster);

        let mut stream = coordinator.live().await.unwrap();

        assert_eq!(take_ids(&mut stream, 1).await, vec![1]);
        assert!(matches!(stream.next().await, Err(StreamError::Broadcast(_))));
        assert!(!stream.holds_subscription());
    }

    #[tokio::test]
    async fn subscribe_failure_is_reported() {
        let store = store_with([]).await;
        let broadcaster = Arc::new(InMemoryBroadcaster::<Event>::new(16));
        broadcaster.set_available(false);
        let coordinator = ReplayCoordinator::new(store, broadcaster);

        assert!(matches!(
            coordinator.stream(Some(0)).await,
            Err(StreamError::Broadcast(_))
        ));
    }

    #[tokio::test]
    async fn closed_feed_ends_stream() {
        let store = store_with([]).await;
        let (broadcaster, tx) = scripted(vec![Ok(event(1))]);
        drop(tx);
        let coordinator = ReplayCoordinator::new(store, broadcaster);

        let mut stream = coordinator.live().await.unwrap();

        assert_eq!(take_ids(&mut stream, 1).await, vec![1]);
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let store = store_with([]).await;
        let broadcaster = Arc::new(InMemoryBroadcaster::<Event>::new(16));
        let coordinator = ReplayCoordinator::new(store, broadcaster.clone());

        let mut stream = coordinator.live().await.unwrap();
        assert!(stream.holds_subscription());

        stream.close();
        stream.close();

        assert_eq!(broadcaster.subscriber_count(), 0);
        assert!(stream.next().await.unwrap().is_none());
    }

    // ==================== Replay-only Tests ====================

    #[tokio::test]
    async fn replay_ends_when_store_is_drained() {
        let store = store_with(1..=5).await;
        let broadcaster = Arc::new(InMemoryBroadcaster::<Event>::new(16));
        let coordinator = ReplayCoordinator::new(store, broadcaster.clone()).with_batch_size(2);

        let ids: Vec<EventId> = coordinator
            .replay(Some(2))
            .into_stream()
            .map(|r| r.unwrap().id)
            .collect()
            .await;

        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn replay_without_token_starts_at_the_beginning() {
        let store = store_with(1..=3).await;
        let coordinator =
            ReplayCoordinator::new(store, Arc::new(InMemoryBroadcaster::<Event>::new(4)));

        let mut stream = coordinator.replay(None);

        assert_eq!(take_ids(&mut stream, 3).await, vec![1, 2, 3]);
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn into_stream_stops_after_error() {
        let store = store_with([1]).await;
        store.set_available(false);
        let coordinator =
            ReplayCoordinator::new(store, Arc::new(InMemoryBroadcaster::<Event>::new(4)));

        let items: Vec<_> = coordinator.replay(None).into_stream().collect().await;

        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
