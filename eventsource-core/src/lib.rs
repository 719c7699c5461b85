//! Core of the eventsource log.
//!
//! Publishing assigns an id, stores the event and only then broadcasts it.
//! Reading splices a historic replay from the store onto the live broadcast
//! without gaps or duplicates, so a client that reconnects with the last id
//! it saw continues exactly where it left off.

pub mod error;
pub mod event;
pub mod event_log;
pub mod publisher;
pub mod replay;
pub mod session;

pub use error::{PublishError, StreamError};
pub use event::{Event, PING};
pub use event_log::EventLog;
pub use publisher::EventPublisher;
pub use replay::{DEFAULT_BATCH_SIZE, ReplayCoordinator, ReplayStream};
pub use session::{ChannelSink, EventSink, SessionOutcome, SinkClosed, StreamMode, StreamSession};

pub use eventsource_log::EventId;
