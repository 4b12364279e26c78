//! Artifact error model.

use thiserror::Error;

/// Result type used by artifact construction and association lookups.
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Artifact construction and association failures.
///
/// `TypeNotAssociated` and `NoAssociation` differ: the first
/// means "unknown local type", the second "unknown wire identifier".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    /// A generation was negative, non-integral or out of range.
    #[error("generation must be a natural number, got {0}")]
    InvalidGeneration(String),

    /// The type or the artifact is already bound to something else.
    #[error("cannot associate {type_name} with {artifact}: {reason}")]
    DuplicateAssociation {
        type_name: &'static str,
        artifact: String,
        reason: String,
    },

    /// The type was never associated with an artifact.
    #[error("type {type_name} is not associated with any artifact")]
    TypeNotAssociated { type_name: &'static str },

    /// No type is associated with the artifact.
    #[error("no type is associated with {artifact}")]
    NoAssociation { artifact: String },
}

impl ArtifactError {
    pub fn invalid_generation(value: impl ToString) -> Self {
        Self::InvalidGeneration(value.to_string())
    }
}
