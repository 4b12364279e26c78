//! The seam between the streaming machinery and processor kinds.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use kestrel_artifacts::EventType;
use kestrel_core::ExecutionContext;

use crate::error::RequestFailure;
use crate::protocol::{CallId, RetryProcessingState};
use crate::registration::ProcessorRegistration;

/// Per-request information the dispatcher hands to a processor.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub call_id: CallId,
    pub execution_context: ExecutionContext,
    pub retry: Option<RetryProcessingState>,
}

impl RequestContext {
    /// Earlier failed attempts at this request (0 on first delivery).
    pub fn retry_attempt(&self) -> u32 {
        self.retry.as_ref().map_or(0, |retry| retry.retry_count)
    }
}

/// A processor kind the dispatcher can drive.
///
/// Implementations resolve their own handler methods (see
/// [`crate::HandlerRegistry`]); the dispatcher takes care of correlation,
/// concurrency and turning failures into responses.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    type Request: DeserializeOwned + Send + 'static;
    type Outcome: Serialize + Send + 'static;

    fn registration(&self) -> &ProcessorRegistration;

    /// Event type carried by `request`, if this kind resolves per event type.
    fn event_type_of(&self, request: &Self::Request) -> Option<EventType>;

    /// Whether an unresolvable event type ends the stream instead of failing
    /// only the request.
    fn resolution_failures_are_fatal(&self) -> bool {
        false
    }

    async fn process(
        &self,
        request: Self::Request,
        context: RequestContext,
    ) -> Result<Self::Outcome, RequestFailure>;
}
