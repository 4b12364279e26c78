//! Projections: fold events into keyed read models held by the runtime.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kestrel_artifacts::{AssociatedType, EventType, EventTypes, ProjectionId};
use kestrel_core::{PartitionId, ScopeId};
use kestrel_events::{CommittedEvent, EventContext, EventError};

use crate::error::{ProcessingError, RequestFailure};
use crate::handlers::HandlerRegistry;
use crate::processor::{Processor, RequestContext};
use crate::registration::{KeySelector, ProcessorRegistration};

/// What an `on` method did to the read model.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionResult<M> {
    Replace(M),
    Delete,
}

/// Read model change as sent to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProjectionOutcome {
    Replace { state: JsonValue },
    Delete,
}

/// An event to project onto the read model stored under `key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRequest {
    pub event: CommittedEvent,
    pub partition_id: PartitionId,
    pub key: String,
    /// `None` when no read model exists under `key` yet.
    #[serde(default)]
    pub current_state: Option<JsonValue>,
}

/// Context handed to projection methods.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionContext {
    pub key: String,
    /// Whether the read model was created from the initial state for this event.
    pub is_first_projection: bool,
    pub event: EventContext,
}

pub(crate) type ProjectionMethod<M> = Arc<
    dyn Fn(M, JsonValue, ProjectionContext) -> BoxFuture<'static, anyhow::Result<ProjectionResult<M>>>
        + Send
        + Sync,
>;

/// Wrap a typed `on` method.
pub(crate) fn typed_method<M, E, F, Fut>(method: F) -> ProjectionMethod<M>
where
    M: Send + 'static,
    E: DeserializeOwned + Send + 'static,
    F: Fn(M, E, ProjectionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ProjectionResult<M>>> + Send + 'static,
{
    Arc::new(move |model: M, content: JsonValue, context: ProjectionContext| {
        match EventContext::decode::<E>(content) {
            Ok(event) => method(model, event, context).boxed(),
            Err(err) => future::ready(Err(err.into())).boxed(),
        }
    })
}

/// Wrap an untyped `on` method.
pub(crate) fn untyped_method<M, F, Fut>(method: F) -> ProjectionMethod<M>
where
    M: 'static,
    F: Fn(M, JsonValue, ProjectionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<ProjectionResult<M>>> + Send + 'static,
{
    Arc::new(move |model: M, content: JsonValue, context: ProjectionContext| {
        method(model, content, context).boxed()
    })
}

/// Read model state from the runtime, or the initial state when there is none.
pub(crate) fn current_or_initial<M>(current: Option<JsonValue>, initial: &M) -> Result<(M, bool), EventError>
where
    M: DeserializeOwned + Clone,
{
    match current {
        Some(state) => EventContext::decode::<M>(state).map(|model| (model, false)),
        None => Ok((initial.clone(), true)),
    }
}

pub(crate) fn to_state<M: Serialize>(model: &M) -> Result<JsonValue, RequestFailure> {
    serde_json::to_value(model).map_err(|e| RequestFailure::Handler(EventError::Serialize(e.to_string()).into()))
}

/// Builds a [`Projection`] of read model `M`.
pub struct ProjectionBuilder<M> {
    id: ProjectionId,
    alias: Option<String>,
    scope: ScopeId,
    initial_state: M,
    typed: Vec<(AssociatedType, KeySelector, ProjectionMethod<M>)>,
    untyped: Vec<(EventType, KeySelector, ProjectionMethod<M>)>,
}

impl<M> ProjectionBuilder<M>
where
    M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(id: ProjectionId, initial_state: M) -> Self {
        Self {
            id,
            alias: None,
            scope: ScopeId::DEFAULT,
            initial_state,
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

    /// Project events of Rust type `E`, keyed by `key_selector`.
    pub fn on<E, F, Fut>(mut self, key_selector: KeySelector, method: F) -> Self
    where
        E: DeserializeOwned + Send + 'static,
        F: Fn(M, E, ProjectionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ProjectionResult<M>>> + Send + 'static,
    {
        self.typed
            .push((AssociatedType::of::<E>(), key_selector, typed_method(method)));
        self
    }

    /// Project raw events of `event_type`, keyed by `key_selector`.
    pub fn on_event_type<F, Fut>(mut self, event_type: EventType, key_selector: KeySelector, method: F) -> Self
    where
        F: Fn(M, JsonValue, ProjectionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ProjectionResult<M>>> + Send + 'static,
    {
        self.untyped
            .push((event_type, key_selector, untyped_method(method)));
        self
    }

    pub fn build(self, event_types: Arc<EventTypes>) -> Result<Projection<M>, ProcessingError> {
        let mut methods = HandlerRegistry::new();
        for (associated, key_selector, method) in self.typed {
            methods.bind_type(&event_types, associated, Some(key_selector), method)?;
        }
        for (event_type, key_selector, method) in self.untyped {
            methods.bind_event_type(event_type, Some(key_selector), method)?;
        }
        if methods.is_empty() {
            return Err(ProcessingError::invalid_registration(format!(
                "projection {} projects no events",
                self.id
            )));
        }

        let initial = serde_json::to_value(&self.initial_state).map_err(|e| {
            ProcessingError::invalid_registration(format!("initial state of projection {}: {e}", self.id))
        })?;
        let registration = ProcessorRegistration::new(self.id)
            .with_alias(self.alias)
            .in_scope(self.scope)
            .with_bindings(methods.bindings().to_vec())
            .with_initial_state(initial);

        Ok(Projection {
            registration,
            initial_state: self.initial_state,
            methods,
            event_types,
        })
    }
}

/// A built projection, ready to be registered.
pub struct Projection<M> {
    registration: ProcessorRegistration,
    initial_state: M,
    methods: HandlerRegistry<ProjectionMethod<M>>,
    event_types: Arc<EventTypes>,
}

impl<M> core::fmt::Debug for Projection<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Projection")
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<M> Processor for Projection<M>
where
    M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Request = ProjectionRequest;
    type Outcome = ProjectionOutcome;

    fn registration(&self) -> &ProcessorRegistration {
        &self.registration
    }

    fn event_type_of(&self, request: &ProjectionRequest) -> Option<EventType> {
        Some(*request.event.event_type())
    }

    async fn process(
        &self,
        request: ProjectionRequest,
        context: RequestContext,
    ) -> Result<ProjectionOutcome, RequestFailure> {
        let method = self
            .methods
            .resolve(request.event.event_type(), &self.event_types)?
            .clone();
        let (model, is_first_projection) = current_or_initial(request.current_state, &self.initial_state)
            .map_err(|e| RequestFailure::Handler(e.into()))?;

        let retry_attempt = context.retry_attempt();
        let (content, event) = EventContext::from_committed(
            request.event,
            context.execution_context,
            request.partition_id,
            retry_attempt,
        );
        let projection_context = ProjectionContext {
            key: request.key,
            is_first_projection,
            event,
        };

        match method(model, content, projection_context).await? {
            ProjectionResult::Replace(model) => Ok(ProjectionOutcome::Replace {
                state: to_state(&model)?,
            }),
            ProjectionResult::Delete => Ok(ProjectionOutcome::Delete),
        }
    }
}
