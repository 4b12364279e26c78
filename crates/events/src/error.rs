use thiserror::Error;

use kestrel_artifacts::ArtifactError;

/// Failures converting between typed events and their JSON envelopes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("event content could not be serialized: {0}")]
    Serialize(String),

    #[error("event content could not be deserialized into {type_name}: {reason}")]
    Deserialize {
        type_name: &'static str,
        reason: String,
    },
}
