//! Event envelopes exchanged with the runtime.

pub mod committed;
pub mod context;
pub mod error;
pub mod event_source;
pub mod uncommitted;

pub use committed::CommittedEvent;
pub use context::EventContext;
pub use error::EventError;
pub use event_source::EventSourceId;
pub use uncommitted::UncommittedEvent;

pub use kestrel_artifacts::{EventType, EventTypeId, EventTypes};
