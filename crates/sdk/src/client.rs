use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use kestrel_artifacts::EventTypes;
use kestrel_processing::{
    ProcessingConfig, Processor, ProcessorHandle, ProcessorId, Subscription, SubscriptionHandle, start_subscription,
};
use kestrel_rpc::ReactiveClient;

use crate::builder::{ClientBuilder, starter};
use crate::error::SdkResult;

/// Running processors and subscriptions sharing one runtime connection.
///
/// Dropping the client cancels everything it started.
#[derive(Debug)]
pub struct Client {
    reactive: ReactiveClient,
    event_types: Arc<EventTypes>,
    config: ProcessingConfig,
    cancellation: CancellationToken,
    processors: Vec<ProcessorHandle>,
    subscriptions: Vec<SubscriptionHandle>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn new(
        reactive: ReactiveClient,
        event_types: Arc<EventTypes>,
        config: ProcessingConfig,
        cancellation: CancellationToken,
        processors: Vec<ProcessorHandle>,
    ) -> Self {
        Self {
            reactive,
            event_types,
            config,
            cancellation,
            processors,
            subscriptions: Vec::new(),
        }
    }

    /// Event types known to this client. Frozen once connected.
    pub fn event_types(&self) -> &Arc<EventTypes> {
        &self.event_types
    }

    pub fn reactive_client(&self) -> &ReactiveClient {
        &self.reactive
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Parent token of every processor and subscription.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn processors(&self) -> &[ProcessorHandle] {
        &self.processors
    }

    pub fn processor(&self, id: impl Into<ProcessorId>) -> Option<&ProcessorHandle> {
        let id = id.into();
        self.processors.iter().find(|handle| handle.id() == id)
    }

    /// Register a processor built outside the builder, e.g. a custom
    /// [`Processor`] implementation.
    pub fn register<P: Processor>(&mut self, processor: P) -> &ProcessorHandle {
        let start = starter(processor);
        let handle = start(self.reactive.clone(), self.config.clone(), &self.cancellation);
        self.processors.push(handle);
        &self.processors[self.processors.len() - 1]
    }

    /// Subscribe to another microservice's public stream in the background.
    pub fn subscribe(&mut self, subscription: Subscription) -> &SubscriptionHandle {
        let handle = start_subscription(
            self.reactive.clone(),
            subscription,
            self.config.clone(),
            &self.cancellation,
        );
        self.subscriptions.push(handle);
        &self.subscriptions[self.subscriptions.len() - 1]
    }

    /// Cancel everything and wait for it to stop.
    ///
    /// Returns the first fatal failure of a processor or subscription, if any.
    #[instrument(skip_all, fields(processors = self.processors.len()))]
    pub async fn shutdown(mut self) -> SdkResult<()> {
        self.cancellation.cancel();

        let mut first_failure = None;
        for handle in std::mem::take(&mut self.processors) {
            let id = handle.id();
            if let Err(err) = handle.join().await {
                warn!(processor_id = %id.uuid(), kind = %id.kind(), error = %err, "processor had failed");
                first_failure.get_or_insert(err);
            }
        }
        for handle in std::mem::take(&mut self.subscriptions) {
            if let Err(err) = handle.join().await {
                warn!(error = %err, "subscription had failed");
                first_failure.get_or_insert(err);
            }
        }

        info!("client stopped");
        match first_failure {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}
