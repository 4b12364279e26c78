//! `kestrel-artifacts`: artifact identity and type associations.
//!
//! An artifact is a globally identified, versioned kind of thing the runtime
//! knows about (event types, projections, embeddings, filters, event
//! handlers). Applications bind their own Rust types to artifacts once, during
//! composition, and the streaming components only ever read the resulting
//! table.

pub mod artifact;
pub mod association;
pub mod error;
pub mod generation;
pub mod ids;

pub use artifact::{Artifact, ArtifactIdKind};
pub use association::{ArtifactAssociations, AssociatedType};
pub use error::{ArtifactError, ArtifactResult};
pub use generation::Generation;
pub use ids::{EmbeddingId, EventHandlerId, EventTypeId, FilterId, ProjectionId};

/// A versioned event type.
pub type EventType = Artifact<EventTypeId>;

/// Association table between Rust event types and their event type artifacts.
pub type EventTypes = ArtifactAssociations<EventTypeId>;
