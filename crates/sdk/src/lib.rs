//! `kestrel-sdk`: one place to declare event types and processors, and to run
//! them against a runtime.
//!
//! ```ignore
//! let client = ClientBuilder::from_env()
//!     .with_event_type::<DishPrepared>(EventType::first(DISH_PREPARED))?
//!     .with_event_handler(kitchen)
//!     .connect(transport)?;
//! // ...
//! client.shutdown().await?;
//! ```

pub mod builder;
pub mod client;
pub mod error;

pub use builder::ClientBuilder;
pub use client::Client;
pub use error::{SdkError, SdkResult};

pub use kestrel_artifacts;
pub use kestrel_core;
pub use kestrel_events;
pub use kestrel_observability;
pub use kestrel_processing;
pub use kestrel_rpc;
