//! Event handlers: react to committed events.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kestrel_artifacts::{AssociatedType, EventHandlerId, EventType, EventTypes};
use kestrel_core::{PartitionId, ScopeId};
use kestrel_events::{CommittedEvent, EventContext};

use crate::error::{ProcessingError, RequestFailure};
use crate::handlers::HandlerRegistry;
use crate::processor::{Processor, RequestContext};
use crate::registration::ProcessorRegistration;

type HandlerMethod = Arc<dyn Fn(JsonValue, EventContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// An event delivered to an event handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandleEventRequest {
    pub event: CommittedEvent,
    pub partition_id: PartitionId,
}

/// Builds an [`EventHandler`].
pub struct EventHandlerBuilder {
    id: EventHandlerId,
    alias: Option<String>,
    scope: ScopeId,
    partitioned: bool,
    typed: Vec<(AssociatedType, HandlerMethod)>,
    untyped: Vec<(EventType, HandlerMethod)>,
}

impl EventHandlerBuilder {
    /// Partitioned, in the default scope.
    pub fn new(id: EventHandlerId) -> Self {
        Self {
            id,
            alias: None,
            scope: ScopeId::DEFAULT,
            partitioned: true,
            typed: Vec::new(),
            untyped: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn in_scope(mut self, scope: ScopeId) -> Self {
        self.scope = scope;
        self
    }

    pub fn unpartitioned(mut self) -> Self {
        self.partitioned = false;
        self
    }

    /// Handle events of Rust type `E`. `E` must be associated with an event type.
    pub fn handle<E, F, Fut>(mut self, handler: F) -> Self
    where
        E: DeserializeOwned + Send + 'static,
        F: Fn(E, EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let method: HandlerMethod = Arc::new(move |content: JsonValue, context: EventContext| {
            match EventContext::decode::<E>(content) {
                Ok(event) => handler(event, context).boxed(),
                Err(err) => future::ready(Err(err.into())).boxed(),
            }
        });
        self.typed.push((AssociatedType::of::<E>(), method));
        self
    }

    /// Handle events of `event_type` as raw JSON.
    pub fn handle_event_type<F, Fut>(mut self, event_type: EventType, handler: F) -> Self
    where
        F: Fn(JsonValue, EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let method: HandlerMethod =
            Arc::new(move |content: JsonValue, context: EventContext| handler(content, context).boxed());
        self.untyped.push((event_type, method));
        self
    }

    pub fn id(&self) -> EventHandlerId {
        self.id
    }

    pub fn build(self, event_types: Arc<EventTypes>) -> Result<EventHandler, ProcessingError> {
        let mut methods = HandlerRegistry::new();
        for (associated, method) in self.typed {
            methods.bind_type(&event_types, associated, None, method)?;
        }
        for (event_type, method) in self.untyped {
            methods.bind_event_type(event_type, None, method)?;
        }
        if methods.is_empty() {
            return Err(ProcessingError::invalid_registration(format!(
                "event handler {} handles no events",
                self.id
            )));
        }

        let registration = ProcessorRegistration::new(self.id)
            .with_alias(self.alias)
            .in_scope(self.scope)
            .partitioned(self.partitioned)
            .with_bindings(methods.bindings().to_vec());

        Ok(EventHandler {
            registration,
            methods,
            event_types,
        })
    }
}

/// A built event handler, ready to be registered.
pub struct EventHandler {
    registration: ProcessorRegistration,
    methods: HandlerRegistry<HandlerMethod>,
    event_types: Arc<EventTypes>,
}

impl core::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventHandler")
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Processor for EventHandler {
    type Request = HandleEventRequest;
    type Outcome = ();

    fn registration(&self) -> &ProcessorRegistration {
        &self.registration
    }

    fn event_type_of(&self, request: &HandleEventRequest) -> Option<EventType> {
        Some(*request.event.event_type())
    }

    async fn process(
        &self,
        request: HandleEventRequest,
        context: RequestContext,
    ) -> Result<(), RequestFailure> {
        let method = self
            .methods
            .resolve(request.event.event_type(), &self.event_types)?
            .clone();
        let retry_attempt = context.retry_attempt();
        let (content, event_context) = EventContext::from_committed(
            request.event,
            context.execution_context,
            request.partition_id,
            retry_attempt,
        );

        method(content, event_context).await?;
        Ok(())
    }
}
