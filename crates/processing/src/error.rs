//! Processing error model and failure classification.

use std::time::Duration;

use thiserror::Error;

use kestrel_artifacts::{ArtifactError, EventType};
use kestrel_rpc::CallError;

use crate::protocol::Failure;
use crate::registration::ProcessorKind;
use crate::subscriptions::StreamId;

/// How the supervisor treats a failed attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailureClass {
    /// Try again after a backoff delay.
    Transient,
    /// Stop and report.
    Fatal,
    /// Stop quietly.
    Cancelled,
}

/// Errors produced while registering and running processors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcessingError {
    #[error("{kind} {processor_id} failed to register: {}", describe(.failure))]
    RegistrationFailed {
        kind: ProcessorKind,
        processor_id: uuid::Uuid,
        failure: Option<Failure>,
    },

    #[error("{kind} {processor_id} got no registration response within {timeout:?}")]
    RegistrationTimeout {
        kind: ProcessorKind,
        processor_id: uuid::Uuid,
        timeout: Duration,
    },

    #[error("subscription to stream {producer_stream} has no partition")]
    MissingPartitionForSubscription { producer_stream: StreamId },

    #[error("event horizon subscription failed: {failure}")]
    EventHorizonSubscriptionFailed { failure: Failure },

    #[error("no type is associated with {event_type}")]
    UnknownEventType { event_type: EventType },

    #[error("{type_name} ({event_type}) has no handler method")]
    UnableToResolveEventType {
        event_type: EventType,
        type_name: &'static str,
    },

    #[error("invalid processor registration: {0}")]
    InvalidRegistration(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Call(CallError),

    #[error("processing stream closed by the runtime")]
    ConnectionClosed,

    #[error("no message from the runtime within {0:?}")]
    PingTimeout(Duration),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("processing was cancelled")]
    Cancelled,

    #[error("processing task failed: {0}")]
    TaskFailed(String),
}

fn describe(failure: &Option<Failure>) -> String {
    match failure {
        Some(failure) => failure.to_string(),
        None => "no registration result".to_string(),
    }
}

impl ProcessingError {
    pub fn invalid_registration(msg: impl Into<String>) -> Self {
        Self::InvalidRegistration(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::Cancelled => FailureClass::Cancelled,

            Self::RegistrationFailed {
                failure: Some(failure),
                ..
            }
            | Self::EventHorizonSubscriptionFailed { failure } => {
                if failure.id().is_structural() {
                    FailureClass::Fatal
                } else {
                    FailureClass::Transient
                }
            }

            Self::RegistrationFailed { failure: None, .. }
            | Self::RegistrationTimeout { .. }
            | Self::Call(_)
            | Self::ConnectionClosed
            | Self::PingTimeout(_) => FailureClass::Transient,

            // Resolution failures only escape the dispatcher for embeddings.
            Self::UnknownEventType { .. }
            | Self::UnableToResolveEventType { .. }
            | Self::MissingPartitionForSubscription { .. }
            | Self::InvalidRegistration(_)
            | Self::Artifact(_)
            | Self::Protocol(_)
            | Self::TaskFailed(_) => FailureClass::Fatal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<CallError> for ProcessingError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Cancelled => Self::Cancelled,
            other => Self::Call(other),
        }
    }
}

/// Why a single request could not be processed.
#[derive(Debug)]
pub enum RequestFailure {
    /// The application's handler returned an error.
    Handler(anyhow::Error),
    /// No handler could be resolved for the request's event type.
    Resolution(ProcessingError),
}

impl From<ProcessingError> for RequestFailure {
    fn from(err: ProcessingError) -> Self {
        Self::Resolution(err)
    }
}

impl From<anyhow::Error> for RequestFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::Handler(err)
    }
}

impl core::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Handler(err) => write!(f, "{err:#}"),
            Self::Resolution(err) => write!(f, "{err}"),
        }
    }
}
