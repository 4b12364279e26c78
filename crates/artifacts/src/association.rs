//! Bidirectional association between Rust types and artifacts.
//!
//! The table is populated during composition (`&mut self`) and shared
//! read-only afterwards, typically behind an `Arc`. Reads take `&self` and
//! never lock.

use std::any::TypeId;
use std::collections::HashMap;

use crate::artifact::{Artifact, ArtifactIdKind};
use crate::error::{ArtifactError, ArtifactResult};

/// A Rust type as seen by an association table.
#[derive(Debug, Copy, Clone)]
pub struct AssociatedType {
    id: TypeId,
    name: &'static str,
}

impl AssociatedType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for AssociatedType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AssociatedType {}

impl core::hash::Hash for AssociatedType {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl core::fmt::Display for AssociatedType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name)
    }
}

/// Append-only type ⇄ artifact table.
///
/// - a type maps to at most one artifact
/// - an artifact maps to at most one type
#[derive(Debug, Clone)]
pub struct ArtifactAssociations<I> {
    by_type: HashMap<TypeId, Artifact<I>>,
    by_artifact: HashMap<Artifact<I>, AssociatedType>,
}

impl<I> Default for ArtifactAssociations<I> {
    fn default() -> Self {
        Self {
            by_type: HashMap::new(),
            by_artifact: HashMap::new(),
        }
    }
}

impl<I: ArtifactIdKind> ArtifactAssociations<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `T` with `artifact`.
    pub fn associate<T: 'static>(&mut self, artifact: Artifact<I>) -> ArtifactResult<()> {
        self.associate_type(AssociatedType::of::<T>(), artifact)
    }

    /// Associate an already captured type with `artifact`.
    ///
    /// Re-associating the exact same pair is a no-op. Binding either side to
    /// something else fails and leaves the table unchanged.
    pub fn associate_type(
        &mut self,
        associated: AssociatedType,
        artifact: Artifact<I>,
    ) -> ArtifactResult<()> {
        let existing_artifact = self.by_type.get(&associated.id);
        let existing_type = self.by_artifact.get(&artifact);

        match (existing_artifact, existing_type) {
            (Some(a), Some(t)) if *a == artifact && *t == associated => return Ok(()),
            (Some(a), _) => {
                return Err(ArtifactError::DuplicateAssociation {
                    type_name: associated.name,
                    artifact: artifact.to_string(),
                    reason: format!("type is already associated with {a}"),
                });
            }
            (None, Some(t)) => {
                return Err(ArtifactError::DuplicateAssociation {
                    type_name: associated.name,
                    artifact: artifact.to_string(),
                    reason: format!("artifact is already associated with type {t}"),
                });
            }
            (None, None) => {}
        }

        self.by_type.insert(associated.id, artifact);
        self.by_artifact.insert(artifact, associated);
        Ok(())
    }

    pub fn has_for<T: 'static>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    pub fn has_artifact(&self, artifact: &Artifact<I>) -> bool {
        self.by_artifact.contains_key(artifact)
    }

    /// Artifact associated with `T`.
    pub fn get_for<T: 'static>(&self) -> ArtifactResult<Artifact<I>> {
        self.get_for_type(&AssociatedType::of::<T>())
    }

    pub fn get_for_type(&self, associated: &AssociatedType) -> ArtifactResult<Artifact<I>> {
        self.by_type
            .get(&associated.id)
            .copied()
            .ok_or(ArtifactError::TypeNotAssociated {
                type_name: associated.name,
            })
    }

    /// Type associated with `artifact`.
    pub fn get_type_for(&self, artifact: &Artifact<I>) -> ArtifactResult<AssociatedType> {
        self.by_artifact
            .get(artifact)
            .copied()
            .ok_or_else(|| ArtifactError::NoAssociation {
                artifact: artifact.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Artifact<I>, &AssociatedType)> {
        self.by_artifact.iter()
    }

    pub fn len(&self) -> usize {
        self.by_artifact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_artifact.is_empty()
    }
}
