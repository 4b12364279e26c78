//! The four processor kinds the runtime knows how to drive.

pub mod embedding;
pub mod event_handler;
pub mod filter;
pub mod projection;

pub use embedding::{Embedding, EmbeddingBuilder, EmbeddingContext, EmbeddingOutcome, EmbeddingRequest};
pub use event_handler::{EventHandler, EventHandlerBuilder, HandleEventRequest};
pub use filter::{Filter, FilterBuilder, FilterDecision, FilterEventRequest};
pub use projection::{
    Projection, ProjectionBuilder, ProjectionContext, ProjectionOutcome, ProjectionRequest, ProjectionResult,
};
