//! Artifacts: `(identifier, generation)` pairs.

use serde::{Deserialize, Serialize};

use crate::generation::Generation;

/// An identifier namespace that artifacts can be built from.
pub trait ArtifactIdKind:
    Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display + Send + Sync + 'static
{
    /// Human readable kind name used in diagnostics (e.g. "event type").
    const KIND: &'static str;

    fn uuid(&self) -> uuid::Uuid;
}

/// Immutable `(id, generation)` pair. Two artifacts are equal iff both match.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact<I> {
    id: I,
    generation: Generation,
}

impl<I: ArtifactIdKind> Artifact<I> {
    pub fn new(id: I, generation: Generation) -> Self {
        Self { id, generation }
    }

    /// Artifact at [`Generation::FIRST`].
    pub fn first(id: I) -> Self {
        Self::new(id, Generation::FIRST)
    }

    pub fn id(&self) -> I {
        self.id
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Same identity, another generation.
    pub fn with_generation(&self, generation: Generation) -> Self {
        Self::new(self.id, generation)
    }
}

impl<I: ArtifactIdKind> From<I> for Artifact<I> {
    fn from(id: I) -> Self {
        Self::first(id)
    }
}

impl<I: ArtifactIdKind> core::fmt::Display for Artifact<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {} (generation {})", I::KIND, self.id, self.generation)
    }
}
