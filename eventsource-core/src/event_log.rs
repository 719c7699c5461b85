//! Wiring of the three collaborators from configuration.

use std::sync::Arc;

use eventsource_log::{
    Broadcaster, EventStore, InMemoryBroadcaster, InMemoryEventStore, InMemorySequenceAllocator,
    LogBackend, LogConfig, PollingBroadcaster, SequenceAllocator, SqliteDatabase,
    SqliteEventStore, SqliteSequenceAllocator,
};
use tracing::info;

use crate::event::Event;
use crate::publisher::EventPublisher;
use crate::replay::ReplayCoordinator;

/// The allocator, store and broadcaster one process works against.
#[derive(Clone)]
pub struct EventLog {
    pub allocator: Arc<dyn SequenceAllocator>,
    pub store: Arc<dyn EventStore<Event>>,
    pub broadcaster: Arc<dyn Broadcaster<Event>>,
}

impl EventLog {
    /// Open the backends selected by `config`.
    ///
    /// With SQLite the live feed tails the database itself, so every process
    /// sharing the file sees the events any of them publishes.
    pub fn open(config: &LogConfig) -> eventsource_log::Result<Self> {
        match config.backend {
            LogBackend::Memory => {
                info!("Using in-memory event log");
                Ok(Self::in_memory(config.channel_capacity))
            }
            LogBackend::Sqlite => {
                let db = SqliteDatabase::open(&config.database_path)?;
                info!(
                    path = %config.database_path.display(),
                    sequence_key = %config.sequence_key,
                    poll_interval = ?config.poll_interval,
                    "Using SQLite event log"
                );
                let store: Arc<dyn EventStore<Event>> =
                    Arc::new(SqliteEventStore::<Event>::new(db.clone()));
                Ok(Self {
                    allocator: Arc::new(SqliteSequenceAllocator::new(
                        db,
                        config.sequence_key.clone(),
                    )),
                    broadcaster: Arc::new(PollingBroadcaster::new(
                        Arc::clone(&store),
                        config.poll_interval,
                    )),
                    store,
                })
            }
        }
    }

    /// Process-local backends.
    pub fn in_memory(channel_capacity: usize) -> Self {
        Self {
            allocator: Arc::new(InMemorySequenceAllocator::new()),
            store: Arc::new(InMemoryEventStore::<Event>::new()),
            broadcaster: Arc::new(InMemoryBroadcaster::<Event>::new(channel_capacity)),
        }
    }

    pub fn publisher(&self) -> EventPublisher {
        EventPublisher::new(
            Arc::clone(&self.allocator),
            Arc::clone(&self.store),
            Arc::clone(&self.broadcaster),
        )
    }

    pub fn coordinator(&self) -> ReplayCoordinator {
        ReplayCoordinator::new(Arc::clone(&self.store), Arc::clone(&self.broadcaster))
    }
}
