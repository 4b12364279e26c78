//! Transport and call error model.

use thiserror::Error;

/// Failure reported by a transport implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote end could not be reached.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The remote end answered with an error status.
    #[error("call failed with status {code}: {message}")]
    Status { code: u16, message: String },

    /// The call was torn down underneath us.
    #[error("call aborted: {0}")]
    Aborted(String),
}

impl TransportError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::Aborted(msg.into())
    }
}

/// Failure of a typed call made through [`crate::ReactiveClient`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode {message}: {reason}")]
    Encode {
        message: &'static str,
        reason: String,
    },

    #[error("failed to decode {message}: {reason}")]
    Decode {
        message: &'static str,
        reason: String,
    },

    #[error("call was cancelled")]
    Cancelled,
}

impl CallError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
