//! Collects event types, processors and subscriptions before connecting.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::info;

use kestrel_artifacts::{EventType, EventTypes};
use kestrel_processing::{
    EmbeddingBuilder, EventHandlerBuilder, FilterBuilder, ProcessingConfig, ProcessingError, Processor,
    ProcessorHandle, ProjectionBuilder, Subscription, register_processor,
};
use kestrel_rpc::{ReactiveClient, Transport};

use crate::client::Client;
use crate::error::SdkResult;

/// Starts a built processor.
pub(crate) type Starter = Box<dyn FnOnce(ReactiveClient, ProcessingConfig, &CancellationToken) -> ProcessorHandle + Send>;

/// Builds a processor once every event type is known.
type Pending = Box<dyn FnOnce(Arc<EventTypes>) -> Result<Starter, ProcessingError> + Send>;

pub(crate) fn starter<P: Processor>(processor: P) -> Starter {
    Box::new(
        move |client: ReactiveClient, config: ProcessingConfig, cancellation: &CancellationToken| {
            register_processor(client, processor, config, cancellation)
        },
    )
}

/// Declares what a [`Client`] runs.
///
/// Nothing talks to the runtime until [`ClientBuilder::connect`].
pub struct ClientBuilder {
    event_types: EventTypes,
    config: ProcessingConfig,
    processors: Vec<Pending>,
    subscriptions: Vec<Subscription>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::with_processing_config(ProcessingConfig::default())
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from [`ProcessingConfig::from_env`].
    pub fn from_env() -> Self {
        Self::with_processing_config(ProcessingConfig::from_env())
    }

    fn with_processing_config(config: ProcessingConfig) -> Self {
        Self {
            event_types: EventTypes::new(),
            config,
            processors: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ProcessingConfig) -> Self {
        self.config = config;
        self
    }

    /// Associate Rust type `E` with `event_type`.
    pub fn with_event_type<E: 'static>(mut self, event_type: EventType) -> SdkResult<Self> {
        self.event_types.associate::<E>(event_type)?;
        Ok(self)
    }

    pub fn with_event_handler(self, handler: EventHandlerBuilder) -> Self {
        self.pending(Box::new(move |event_types| handler.build(event_types).map(starter)))
    }

    pub fn with_filter(self, filter: FilterBuilder) -> Self {
        self.pending(Box::new(move |_| filter.build().map(starter)))
    }

    pub fn with_projection<M>(self, projection: ProjectionBuilder<M>) -> Self
    where
        M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.pending(Box::new(move |event_types| projection.build(event_types).map(starter)))
    }

    pub fn with_embedding<M>(self, embedding: EmbeddingBuilder<M>) -> Self
    where
        M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.pending(Box::new(move |event_types| embedding.build(event_types).map(starter)))
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    fn pending(mut self, build: Pending) -> Self {
        self.processors.push(build);
        self
    }

    /// Build every processor, then register them all over `transport`.
    ///
    /// Must be called from within a tokio runtime. Nothing is started when a
    /// processor fails to build.
    pub fn connect<T: Transport>(self, transport: T) -> SdkResult<Client> {
        self.connect_with(ReactiveClient::from_transport(transport))
    }

    pub fn connect_with(self, client: ReactiveClient) -> SdkResult<Client> {
        let event_types = Arc::new(self.event_types);
        let starters = self
            .processors
            .into_iter()
            .map(|build| build(event_types.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let cancellation = CancellationToken::new();
        let processors = starters
            .into_iter()
            .map(|start| start(client.clone(), self.config.clone(), &cancellation))
            .collect::<Vec<_>>();
        info!(
            processors = processors.len(),
            event_types = event_types.len(),
            "client started"
        );

        let mut client = Client::new(client, event_types, self.config, cancellation, processors);
        for subscription in self.subscriptions {
            client.subscribe(subscription);
        }
        Ok(client)
    }
}
