use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kestrel_artifacts::{EventType, EventTypes};

use crate::error::EventError;
use crate::event_source::EventSourceId;

/// An event produced by the SDK that the runtime has not committed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    event_source_id: EventSourceId,
    event_type: EventType,
    content: JsonValue,
    public: bool,
}

impl UncommittedEvent {
    pub fn new(
        event_source_id: impl Into<EventSourceId>,
        event_type: EventType,
        content: JsonValue,
        public: bool,
    ) -> Self {
        Self {
            event_source_id: event_source_id.into(),
            event_type,
            content,
            public,
        }
    }

    /// Build from a typed event, resolving its event type through `event_types`.
    pub fn from_typed<E: Serialize + 'static>(
        event_source_id: impl Into<EventSourceId>,
        event: &E,
        event_types: &EventTypes,
        public: bool,
    ) -> Result<Self, EventError> {
        let event_type = event_types.get_for::<E>()?;
        let content =
            serde_json::to_value(event).map_err(|e| EventError::Serialize(e.to_string()))?;
        Ok(Self::new(event_source_id, event_type, content, public))
    }

    pub fn event_source_id(&self) -> &EventSourceId {
        &self.event_source_id
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn content(&self) -> &JsonValue {
        &self.content
    }

    pub fn is_public(&self) -> bool {
        self.public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_artifacts::{ArtifactError, EventTypeId};
    use serde_json::json;

    #[derive(Serialize)]
    struct DishPrepared {
        dish: String,
    }

    #[test]
    fn typed_events_resolve_their_event_type() {
        let mut types = EventTypes::new();
        let event_type = EventType::first(EventTypeId::from_u128(1));
        types.associate::<DishPrepared>(event_type).unwrap();

        let event = UncommittedEvent::from_typed(
            "kitchen",
            &DishPrepared {
                dish: "Bean Blaster Taco".to_string(),
            },
            &types,
            false,
        )
        .unwrap();

        assert_eq!(event.event_type(), &event_type);
        assert_eq!(event.content(), &json!({ "dish": "Bean Blaster Taco" }));
        assert_eq!(event.event_source_id().as_str(), "kitchen");
    }

    #[test]
    fn unassociated_types_are_rejected() {
        let types = EventTypes::new();

        let err = UncommittedEvent::from_typed(
            "kitchen",
            &DishPrepared {
                dish: "Avocado Artillery".to_string(),
            },
            &types,
            false,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            EventError::Artifact(ArtifactError::TypeNotAssociated { .. })
        ));
    }
}
