use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kestrel_artifacts::EventType;
use kestrel_core::ExecutionContext;

use crate::error::EventError;
use crate::event_source::EventSourceId;

/// An event as committed to the runtime's event log.
///
/// Notes:
/// - `event_log_sequence_number` is the position in the scope's event log.
/// - `content` is kept as JSON; handlers deserialize into their own types.
/// - `execution_context` is the context the event was committed under, not the
///   one of the current processing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedEvent {
    event_log_sequence_number: u64,
    occurred: DateTime<Utc>,
    event_source_id: EventSourceId,
    execution_context: ExecutionContext,
    event_type: EventType,
    content: JsonValue,
    public: bool,
}

impl CommittedEvent {
    pub fn new(
        event_log_sequence_number: u64,
        occurred: DateTime<Utc>,
        event_source_id: impl Into<EventSourceId>,
        execution_context: ExecutionContext,
        event_type: EventType,
        content: JsonValue,
        public: bool,
    ) -> Self {
        Self {
            event_log_sequence_number,
            occurred,
            event_source_id: event_source_id.into(),
            execution_context,
            event_type,
            content,
            public,
        }
    }

    pub fn event_log_sequence_number(&self) -> u64 {
        self.event_log_sequence_number
    }

    pub fn occurred(&self) -> DateTime<Utc> {
        self.occurred
    }

    pub fn event_source_id(&self) -> &EventSourceId {
        &self.event_source_id
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        &self.execution_context
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn content(&self) -> &JsonValue {
        &self.content
    }

    pub fn into_content(self) -> JsonValue {
        self.content
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    /// Deserialize the content into `E`.
    pub fn deserialize<E: DeserializeOwned>(&self) -> Result<E, EventError> {
        deserialize_content(self.content.clone())
    }
}

pub(crate) fn deserialize_content<E: DeserializeOwned>(content: JsonValue) -> Result<E, EventError> {
    serde_json::from_value(content).map_err(|e| EventError::Deserialize {
        type_name: std::any::type_name::<E>(),
        reason: e.to_string(),
    })
}
