//! Artifact identifier namespaces.

use kestrel_core::uuid_newtype;

use crate::artifact::ArtifactIdKind;

uuid_newtype! {
    /// Identifier of an event type.
    pub struct EventTypeId, "EventTypeId"
}

uuid_newtype! {
    /// Identifier of an event handler processor.
    pub struct EventHandlerId, "EventHandlerId"
}

uuid_newtype! {
    /// Identifier of a filter processor.
    pub struct FilterId, "FilterId"
}

uuid_newtype! {
    /// Identifier of a projection.
    pub struct ProjectionId, "ProjectionId"
}

uuid_newtype! {
    /// Identifier of an embedding.
    pub struct EmbeddingId, "EmbeddingId"
}

macro_rules! impl_artifact_id_kind {
    ($t:ty, $kind:literal) => {
        impl ArtifactIdKind for $t {
            const KIND: &'static str = $kind;

            fn uuid(&self) -> uuid::Uuid {
                *self.as_uuid()
            }
        }
    };
}

impl_artifact_id_kind!(EventTypeId, "event type");
impl_artifact_id_kind!(EventHandlerId, "event handler");
impl_artifact_id_kind!(FilterId, "filter");
impl_artifact_id_kind!(ProjectionId, "projection");
impl_artifact_id_kind!(EmbeddingId, "embedding");
