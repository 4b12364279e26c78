//! Registration descriptors sent when a processor stream is opened.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kestrel_artifacts::{EmbeddingId, EventHandlerId, EventType, FilterId, ProjectionId};
use kestrel_core::ScopeId;

/// The four kinds of processors the runtime drives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    EventHandler,
    Filter,
    Projection,
    Embedding,
}

impl ProcessorKind {
    /// Runtime service that accepts this kind of processor.
    pub fn service(&self) -> &'static str {
        match self {
            Self::EventHandler => "kestrel.runtime.events.processing.EventHandlers",
            Self::Filter => "kestrel.runtime.events.processing.Filters",
            Self::Projection => "kestrel.runtime.projections.Projections",
            Self::Embedding => "kestrel.runtime.embeddings.Embeddings",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventHandler => "event handler",
            Self::Filter => "filter",
            Self::Projection => "projection",
            Self::Embedding => "embedding",
        }
    }
}

impl core::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed identity of a processor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ProcessorId {
    EventHandler(EventHandlerId),
    Filter(FilterId),
    Projection(ProjectionId),
    Embedding(EmbeddingId),
}

impl ProcessorId {
    pub fn kind(&self) -> ProcessorKind {
        match self {
            Self::EventHandler(_) => ProcessorKind::EventHandler,
            Self::Filter(_) => ProcessorKind::Filter,
            Self::Projection(_) => ProcessorKind::Projection,
            Self::Embedding(_) => ProcessorKind::Embedding,
        }
    }

    pub fn uuid(&self) -> uuid::Uuid {
        match self {
            Self::EventHandler(id) => *id.as_uuid(),
            Self::Filter(id) => *id.as_uuid(),
            Self::Projection(id) => *id.as_uuid(),
            Self::Embedding(id) => *id.as_uuid(),
        }
    }
}

impl core::fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.kind(), self.uuid())
    }
}

impl From<EventHandlerId> for ProcessorId {
    fn from(id: EventHandlerId) -> Self {
        Self::EventHandler(id)
    }
}

impl From<FilterId> for ProcessorId {
    fn from(id: FilterId) -> Self {
        Self::Filter(id)
    }
}

impl From<ProjectionId> for ProcessorId {
    fn from(id: ProjectionId) -> Self {
        Self::Projection(id)
    }
}

impl From<EmbeddingId> for ProcessorId {
    fn from(id: EmbeddingId) -> Self {
        Self::Embedding(id)
    }
}

/// How the runtime derives a read model key from an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum KeySelector {
    EventSourceId,
    PartitionId,
    /// Name of a top-level property of the event content.
    Property(String),
}

/// An event type the processor handles, with its projection key selector if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBinding {
    pub event_type: EventType,
    #[serde(default)]
    pub key_selector: Option<KeySelector>,
}

/// Immutable registration descriptor of one processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorRegistration {
    id: ProcessorId,
    alias: Option<String>,
    scope: ScopeId,
    partitioned: bool,
    public: bool,
    bindings: Vec<ArtifactBinding>,
    initial_state: Option<JsonValue>,
}

impl ProcessorRegistration {
    /// Unaliased, unpartitioned, private, default scope, no bindings.
    pub fn new(id: impl Into<ProcessorId>) -> Self {
        Self {
            id: id.into(),
            alias: None,
            scope: ScopeId::DEFAULT,
            partitioned: false,
            public: false,
            bindings: Vec::new(),
            initial_state: None,
        }
    }

    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    pub fn in_scope(mut self, scope: ScopeId) -> Self {
        self.scope = scope;
        self
    }

    pub fn partitioned(mut self, partitioned: bool) -> Self {
        self.partitioned = partitioned;
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn with_bindings(mut self, bindings: Vec<ArtifactBinding>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_initial_state(mut self, state: JsonValue) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    pub fn kind(&self) -> ProcessorKind {
        self.id.kind()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn is_partitioned(&self) -> bool {
        self.partitioned
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn bindings(&self) -> &[ArtifactBinding] {
        &self.bindings
    }

    pub fn initial_state(&self) -> Option<&JsonValue> {
        self.initial_state.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_artifacts::EventTypeId;
    use serde_json::json;

    #[test]
    fn identity_determines_the_kind() {
        let registration = ProcessorRegistration::new(ProjectionId::from_u128(5));

        assert_eq!(registration.kind(), ProcessorKind::Projection);
        assert_eq!(registration.scope(), ScopeId::DEFAULT);
        assert!(!registration.is_partitioned());
    }

    #[test]
    fn serializes_as_a_descriptor() {
        let registration = ProcessorRegistration::new(EventHandlerId::from_u128(1))
            .with_alias(Some("kitchen".to_string()))
            .partitioned(true)
            .with_bindings(vec![ArtifactBinding {
                event_type: EventType::first(EventTypeId::from_u128(2)),
                key_selector: Some(KeySelector::Property("dish".to_string())),
            }]);

        let value = serde_json::to_value(&registration).unwrap();

        assert_eq!(value["id"]["kind"], "event_handler");
        assert_eq!(value["alias"], "kitchen");
        assert_eq!(value["partitioned"], true);
        assert_eq!(
            value["bindings"][0]["key_selector"],
            json!({ "type": "property", "value": "dish" })
        );

        let back: ProcessorRegistration = serde_json::from_value(value).unwrap();
        assert_eq!(back, registration);
    }
}
