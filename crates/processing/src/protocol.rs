//! Messages exchanged with the runtime over a processor's duplex call.
//!
//! ```text
//! client  ── Connect ──────────────────────────────▶ runtime
//! client  ◀───────────────────────────── Connected ── runtime   (first message)
//! client  ◀────── Request { call_id, .. } / Ping ──── runtime
//! client  ── Response { call_id, .. } / Pong ──────▶ runtime
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use kestrel_core::{ExecutionContext, uuid_newtype};

use crate::registration::ProcessorRegistration;

uuid_newtype! {
    /// Correlates a processing request with its response.
    pub struct CallId, "CallId"
}

uuid_newtype! {
    /// Well-known identifier of a runtime failure.
    pub struct FailureId, "FailureId"
}

impl FailureId {
    /// A processor with the same identifier is already registered.
    pub const ALREADY_REGISTERED: FailureId = FailureId::from_u128(0x6f3a_2c4e_91b7_4d0a_8e55_a1c3_b2d4_e6f7);

    /// The registration descriptor was rejected as malformed.
    pub const INVALID_REGISTRATION: FailureId = FailureId::from_u128(0x2b8e_7d1f_0c4a_4e9b_b3d6_5f2a_9c1e_8d70);

    /// Failures that will not go away by registering again.
    pub fn is_structural(&self) -> bool {
        *self == Self::ALREADY_REGISTERED || *self == Self::INVALID_REGISTRATION
    }
}

/// A failure reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    id: FailureId,
    reason: String,
}

impl Failure {
    pub fn new(id: FailureId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }

    pub fn id(&self) -> FailureId {
        self.id
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl core::fmt::Display for Failure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.reason, self.id)
    }
}

/// First outbound message of every processor stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub registration: ProcessorRegistration,
    pub execution_context: ExecutionContext,
    /// How often the runtime should ping this stream.
    pub ping_interval: Duration,
}

/// Outcome of a registration. `failure: None` means the registration holds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrationResponse {
    #[serde(default)]
    pub failure: Option<Failure>,
}

/// Present on requests the runtime is delivering again after a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryProcessingState {
    pub failure_reason: String,
    pub retry_count: u32,
}

/// A processing request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRequest<Req> {
    pub call_id: CallId,
    pub execution_context: ExecutionContext,
    pub request: Req,
    #[serde(default)]
    pub retry: Option<RetryProcessingState>,
}

/// Why a request could not be processed, and whether the runtime should retry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorFailure {
    pub reason: String,
    pub retry: bool,
    #[serde(default)]
    pub retry_timeout: Option<Duration>,
}

impl ProcessorFailure {
    /// Failure the runtime should retry at its own pace.
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retry: true,
            retry_timeout: None,
        }
    }

    /// Failure that retrying will not fix.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            retry: false,
            retry_timeout: None,
        }
    }
}

/// Result of processing one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Processed<T> {
    Success(T),
    Failure(ProcessorFailure),
}

impl<T> Processed<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Messages written by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage<T> {
    Connect(ConnectRequest),
    Response {
        call_id: CallId,
        response: Processed<T>,
    },
    Pong,
}

/// Messages written by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeMessage<Req> {
    Connected(RegistrationResponse),
    Request(ProcessingRequest<Req>),
    Ping,
}

impl<Req> RuntimeMessage<Req> {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::Request(_) => "request",
            Self::Ping => "ping",
        }
    }
}
