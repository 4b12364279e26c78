use thiserror::Error;

use kestrel_artifacts::ArtifactError;
use kestrel_processing::ProcessingError;

/// Errors surfaced by the client facade.
#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

pub type SdkResult<T> = Result<T, SdkError>;
