//! Shared application state for the eventsource server

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eventsource_core::{
    Event, EventLog, EventPublisher, EventSink, ReplayCoordinator, StreamSession,
};
use eventsource_log::Broadcaster;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Default interval between SSE keep-alive comments
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Live buffer of the log used by [`AppState::new_for_testing`]
const TEST_CHANNEL_CAPACITY: usize = 1024;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Store-then-broadcast write path
    pub publisher: EventPublisher,
    /// Builds the per-client replay streams
    pub coordinator: ReplayCoordinator,
    /// Live feed, kept for shutdown and subscriber counts
    pub broadcaster: Arc<dyn Broadcaster<Event>>,
    /// Interval between SSE keep-alive comments
    pub keep_alive: Duration,
    /// Cancelled once the process starts shutting down
    pub shutdown: CancellationToken,
    /// Running stream sessions
    sessions: TaskTracker,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state over an opened event log
    pub fn new(log: &EventLog) -> Self {
        Self {
            publisher: log.publisher(),
            coordinator: log.coordinator(),
            broadcaster: Arc::clone(&log.broadcaster),
            keep_alive: DEFAULT_KEEP_ALIVE,
            shutdown: CancellationToken::new(),
            sessions: TaskTracker::new(),
            started_at: Utc::now(),
        }
    }

    /// Create state over process-local backends (for testing)
    pub fn new_for_testing() -> Self {
        Self::new(&EventLog::in_memory(TEST_CHANNEL_CAPACITY))
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.coordinator = self.coordinator.with_batch_size(batch_size);
        self
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Number of stream sessions currently running
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Number of live subscriptions currently held
    pub fn live_subscriptions(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    /// Run a session in the background until it ends
    pub fn spawn_session<S>(&self, session: StreamSession<S>)
    where
        S: EventSink + 'static,
    {
        debug!(
            session = %session.id(),
            mode = session.mode().as_str(),
            running = self.sessions.len(),
            "Spawning stream session"
        );
        self.sessions.spawn(session.run());
    }

    /// Cancel every session, wait for them to release their subscriptions,
    /// then close the live feed.
    pub async fn shutdown(&self) {
        info!(
            sessions = self.sessions.len(),
            "Shutting down stream sessions"
        );
        self.shutdown.cancel();
        self.sessions.close();
        self.sessions.wait().await;
        self.broadcaster.shutdown().await;
        info!("Event broadcaster shut down");
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new_for_testing()
    }
}
