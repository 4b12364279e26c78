//! `kestrel-processing`: register processors with the runtime and serve
//! their requests.
//!
//! A processor (event handler, filter, projection or embedding) registers over
//! a duplex call, then answers the runtime's processing requests on the same
//! call. [`register_processor`] keeps it registered across failures until its
//! cancellation token fires.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod processor;
pub mod processors;
pub mod protocol;
pub mod registration;
pub mod retry;
pub mod session;
pub mod subscriptions;
pub mod supervisor;

pub use config::ProcessingConfig;
pub use error::{FailureClass, ProcessingError, RequestFailure};
pub use handlers::HandlerRegistry;
pub use processor::{Processor, RequestContext};
pub use processors::{
    Embedding, EmbeddingBuilder, EmbeddingContext, EmbeddingOutcome, EmbeddingRequest, EventHandler,
    EventHandlerBuilder, Filter, FilterBuilder, FilterDecision, FilterEventRequest, HandleEventRequest, Projection,
    ProjectionBuilder, ProjectionContext, ProjectionOutcome, ProjectionRequest, ProjectionResult,
};
pub use protocol::{
    CallId, ClientMessage, ConnectRequest, Failure, FailureId, Processed, ProcessingRequest, ProcessorFailure,
    RegistrationResponse, RetryProcessingState, RuntimeMessage,
};
pub use registration::{ArtifactBinding, KeySelector, ProcessorId, ProcessorKind, ProcessorRegistration};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use session::{RegistrationOutcome, SessionState, SessionTransition, StreamSession};
pub use subscriptions::{
    ConsentId, StreamId, Subscription, SubscriptionHandle, start_subscription, subscribe_to_event_horizon,
};
pub use supervisor::{ProcessorHandle, ProcessorStats, register_processor};
