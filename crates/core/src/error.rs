//! Construction-time error model.

use thiserror::Error;

/// Error raised while constructing identifiers.
///
/// These fail immediately at construction time and never reach the runtime
/// protocol.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
