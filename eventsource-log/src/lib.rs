//! Leaf collaborators of the eventsource log.
//!
//! This crate owns the three external pieces the log is built on: a shared
//! sequence generator, a durable ordered store and a best-effort broadcast
//! channel. Each one is a narrow async trait so the replay logic above it
//! does not care which technology backs it.
//!
//! # Key Types
//!
//! - [`SequenceAllocator`] - Hands out strictly increasing event ids
//! - [`EventStore`] - Appends events and queries them by id range
//! - [`Broadcaster`] - Publishes events to live [`Subscription`]s
//! - [`InMemoryEventStore`], [`InMemoryBroadcaster`], [`InMemorySequenceAllocator`] -
//!   Single-process backends
//! - [`SqliteEventStore`], [`SqliteSequenceAllocator`] - Durable backends that
//!   several processes can share
//! - [`PollingBroadcaster`] - Live feed that tails a shared store, so
//!   subscribers see events appended by any process

pub mod config;
pub mod error;
pub mod memory;
mod migrations;
pub mod polling;
pub mod sqlite;
pub mod traits;

// Re-exports
pub use config::{LogBackend, LogConfig};
pub use error::{Error, Result};
pub use memory::{InMemoryBroadcaster, InMemoryEventStore, InMemorySequenceAllocator};
pub use polling::PollingBroadcaster;
pub use sqlite::{SqliteDatabase, SqliteEventStore, SqliteSequenceAllocator};
pub use traits::{Broadcaster, EventId, EventStore, SequenceAllocator, Sequenced, Subscription};
