//! Embeddings: read models that can be pushed back into the event log.
//!
//! An embedding projects events like a projection does. In addition, the
//! runtime asks it to *resolve* an externally updated or deleted read model
//! into events that, once committed and projected, produce that state.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kestrel_artifacts::{AssociatedType, EmbeddingId, EventType, EventTypes};
use kestrel_core::{ExecutionContext, PartitionId, ScopeId};
use kestrel_events::{CommittedEvent, EventContext, EventError, UncommittedEvent};

use crate::error::{ProcessingError, RequestFailure};
use crate::handlers::HandlerRegistry;
use crate::processor::{Processor, RequestContext};
use crate::processors::projection::{
    ProjectionContext, ProjectionMethod, ProjectionOutcome, ProjectionResult, current_or_initial, to_state,
    typed_method, untyped_method,
};
use crate::registration::{KeySelector, ProcessorRegistration};

type ResolveUpdate<M> =
    Arc<dyn Fn(M, M, EmbeddingContext) -> BoxFuture<'static, anyhow::Result<Vec<UncommittedEvent>>> + Send + Sync>;
type ResolveDeletion<M> =
    Arc<dyn Fn(M, EmbeddingContext) -> BoxFuture<'static, anyhow::Result<Vec<UncommittedEvent>>> + Send + Sync>;

/// Requests the runtime sends to an embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingRequest {
    /// Project a committed event onto the read model under `key`.
    Projection {
        event: CommittedEvent,
        key: String,
        #[serde(default)]
        current_state: Option<JsonValue>,
    },
    /// Produce events that turn `current_state` into `received_state`.
    Compare {
        key: String,
        received_state: JsonValue,
        #[serde(default)]
        current_state: Option<JsonValue>,
    },
    /// Produce events that delete the read model under `key`.
    Delete { key: String, current_state: JsonValue },
}

/// What an embedding sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingOutcome {
    Replace { state: JsonValue },
    Delete,
    Events { events: Vec<UncommittedEvent> },
}

impl From<ProjectionOutcome> for EmbeddingOutcome {
    fn from(outcome: ProjectionOutcome) -> Self {
        match outcome {
            ProjectionOutcome::Replace { state } => Self::Replace { state },
            ProjectionOutcome::Delete => Self::Delete,
        }
    }
}

/// Context handed to `resolve_update` and `resolve_deletion`.
#[derive(Debug, Clone)]
pub struct EmbeddingContext {
    key: String,
    execution_context: ExecutionContext,
    event_types: Arc<EventTypes>,
}

impl EmbeddingContext {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        &self.execution_context
    }

    /// A private event sourced by this embedding's key.
    pub fn event<E: Serialize + 'static>(&self, event: &E) -> Result<UncommittedEvent, EventError> {
        UncommittedEvent::from_typed(self.key.as_str(), event, &self.event_types, false)
    }

    /// A public event sourced by this embedding's key.
    pub fn public_event<E: Serialize + 'static>(&self, event: &E) -> Result<UncommittedEvent, EventError> {
        UncommittedEvent::from_typed(self.key.as_str(), event, &self.event_types, true)
    }
}

/// Builds an [`Embedding`] of read model `M`.
pub struct EmbeddingBuilder<M> {
    id: EmbeddingId,
    alias: Option<String>,
    scope: ScopeId,
    initial_state: M,
    typed: Vec<(AssociatedType, ProjectionMethod<M>)>,
    untyped: Vec<(EventType, ProjectionMethod<M>)>,
    update: Option<ResolveUpdate<M>>,
    deletion: Option<ResolveDeletion<M>>,
}

impl<M> EmbeddingBuilder<M>
where
    M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(id: EmbeddingId, initial_state: M) -> Self {
        Self {
            id,
            alias: None,
            scope: ScopeId::DEFAULT,
            initial_state,
            typed: Vec::new(),
            untyped: Vec::new(),
            update: None,
            deletion: None,
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

    /// Project events of Rust type `E`.
    pub fn on<E, F, Fut>(mut self, method: F) -> Self
    where
        E: DeserializeOwned + Send + 'static,
        F: Fn(M, E, ProjectionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ProjectionResult<M>>> + Send + 'static,
    {
        self.typed.push((AssociatedType::of::<E>(), typed_method(method)));
        self
    }

    /// Project raw events of `event_type`.
    pub fn on_event_type<F, Fut>(mut self, event_type: EventType, method: F) -> Self
    where
        F: Fn(M, JsonValue, ProjectionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ProjectionResult<M>>> + Send + 'static,
    {
        self.untyped.push((event_type, untyped_method(method)));
        self
    }

    /// Events that turn the current read model (second argument) into the
    /// received one (first argument).
    pub fn resolve_update<F, Fut>(mut self, resolve: F) -> Self
    where
        F: Fn(M, M, EmbeddingContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<UncommittedEvent>>> + Send + 'static,
    {
        self.update = Some(Arc::new(move |received: M, current: M, context: EmbeddingContext| {
            resolve(received, current, context).boxed()
        }));
        self
    }

    /// Events that delete the current read model.
    pub fn resolve_deletion<F, Fut>(mut self, resolve: F) -> Self
    where
        F: Fn(M, EmbeddingContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<UncommittedEvent>>> + Send + 'static,
    {
        self.deletion = Some(Arc::new(move |current: M, context: EmbeddingContext| {
            resolve(current, context).boxed()
        }));
        self
    }

    pub fn build(self, event_types: Arc<EventTypes>) -> Result<Embedding<M>, ProcessingError> {
        let id = self.id;
        let missing = |what: &str| ProcessingError::invalid_registration(format!("embedding {id} has no {what}"));
        let update = self.update.ok_or_else(|| missing("update resolver"))?;
        let deletion = self.deletion.ok_or_else(|| missing("deletion resolver"))?;

        let mut methods = HandlerRegistry::new();
        for (associated, method) in self.typed {
            methods.bind_type(&event_types, associated, Some(KeySelector::EventSourceId), method)?;
        }
        for (event_type, method) in self.untyped {
            methods.bind_event_type(event_type, Some(KeySelector::EventSourceId), method)?;
        }
        if methods.is_empty() {
            return Err(missing("projection methods"));
        }

        let initial = serde_json::to_value(&self.initial_state)
            .map_err(|e| ProcessingError::invalid_registration(format!("initial state of embedding {id}: {e}")))?;
        let registration = ProcessorRegistration::new(id)
            .with_alias(self.alias)
            .in_scope(self.scope)
            .with_bindings(methods.bindings().to_vec())
            .with_initial_state(initial);

        Ok(Embedding {
            registration,
            initial_state: self.initial_state,
            methods,
            update,
            deletion,
            event_types,
        })
    }
}

/// A built embedding, ready to be registered.
pub struct Embedding<M> {
    registration: ProcessorRegistration,
    initial_state: M,
    methods: HandlerRegistry<ProjectionMethod<M>>,
    update: ResolveUpdate<M>,
    deletion: ResolveDeletion<M>,
    event_types: Arc<EventTypes>,
}

impl<M> core::fmt::Debug for Embedding<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Embedding")
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

impl<M> Embedding<M>
where
    M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn context(&self, key: String, execution_context: ExecutionContext) -> EmbeddingContext {
        EmbeddingContext {
            key,
            execution_context,
            event_types: self.event_types.clone(),
        }
    }

    async fn project(
        &self,
        event: CommittedEvent,
        key: String,
        current_state: Option<JsonValue>,
        context: RequestContext,
    ) -> Result<EmbeddingOutcome, RequestFailure> {
        let method = self.methods.resolve(event.event_type(), &self.event_types)?.clone();
        let (model, is_first_projection) =
            current_or_initial(current_state, &self.initial_state).map_err(|e| RequestFailure::Handler(e.into()))?;

        let retry_attempt = context.retry_attempt();
        let (content, event) =
            EventContext::from_committed(event, context.execution_context, PartitionId::UNSPECIFIED, retry_attempt);
        let projection_context = ProjectionContext {
            key,
            is_first_projection,
            event,
        };

        let outcome = match method(model, content, projection_context).await? {
            ProjectionResult::Replace(model) => ProjectionOutcome::Replace {
                state: to_state(&model)?,
            },
            ProjectionResult::Delete => ProjectionOutcome::Delete,
        };
        Ok(outcome.into())
    }
}

fn decode_state<M: DeserializeOwned>(state: JsonValue) -> Result<M, RequestFailure> {
    EventContext::decode::<M>(state).map_err(|e| RequestFailure::Handler(e.into()))
}

#[async_trait]
impl<M> Processor for Embedding<M>
where
    M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Request = EmbeddingRequest;
    type Outcome = EmbeddingOutcome;

    fn registration(&self) -> &ProcessorRegistration {
        &self.registration
    }

    fn event_type_of(&self, request: &EmbeddingRequest) -> Option<EventType> {
        match request {
            EmbeddingRequest::Projection { event, .. } => Some(*event.event_type()),
            EmbeddingRequest::Compare { .. } | EmbeddingRequest::Delete { .. } => None,
        }
    }

    fn resolution_failures_are_fatal(&self) -> bool {
        true
    }

    async fn process(
        &self,
        request: EmbeddingRequest,
        context: RequestContext,
    ) -> Result<EmbeddingOutcome, RequestFailure> {
        match request {
            EmbeddingRequest::Projection {
                event,
                key,
                current_state,
            } => self.project(event, key, current_state, context).await,

            EmbeddingRequest::Compare {
                key,
                received_state,
                current_state,
            } => {
                let received = decode_state::<M>(received_state)?;
                let current = match current_state {
                    Some(state) => decode_state::<M>(state)?,
                    None => self.initial_state.clone(),
                };
                let events = (self.update)(received, current, self.context(key, context.execution_context)).await?;
                Ok(EmbeddingOutcome::Events { events })
            }

            EmbeddingRequest::Delete { key, current_state } => {
                let current = decode_state::<M>(current_state)?;
                let events = (self.deletion)(current, self.context(key, context.execution_context)).await?;
                Ok(EmbeddingOutcome::Events { events })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CallId;
    use anyhow::bail;
    use chrono::Utc;
    use kestrel_artifacts::EventTypeId;
    use kestrel_core::{CorrelationId, MicroserviceId, TenantId};
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Employee {
        name: String,
        role: String,
    }

    #[derive(Serialize, Deserialize)]
    struct EmployeeHired {
        name: String,
    }

    #[derive(Serialize, Deserialize)]
    struct EmployeeTransferred {
        role: String,
    }

    #[derive(Serialize, Deserialize)]
    struct EmployeeRetired;

    fn event_type(n: u128) -> EventType {
        EventType::first(EventTypeId::from_u128(n))
    }

    fn event_types() -> Arc<EventTypes> {
        let mut types = EventTypes::new();
        types.associate::<EmployeeHired>(event_type(1)).unwrap();
        types.associate::<EmployeeTransferred>(event_type(2)).unwrap();
        types.associate::<EmployeeRetired>(event_type(3)).unwrap();
        Arc::new(types)
    }

    fn execution_context() -> ExecutionContext {
        ExecutionContext::new(
            MicroserviceId::from_u128(1),
            TenantId::from_u128(2),
            "1.0.0",
            "test",
            CorrelationId::from_u128(3),
        )
    }

    fn request_context() -> RequestContext {
        RequestContext {
            call_id: CallId::from_u128(1),
            execution_context: execution_context(),
            retry: None,
        }
    }

    fn embedding() -> Embedding<Employee> {
        EmbeddingBuilder::new(EmbeddingId::from_u128(9), Employee::default())
            .on::<EmployeeHired, _, _>(|mut employee: Employee, event, _| async move {
                employee.name = event.name;
                Ok(ProjectionResult::Replace(employee))
            })
            .on::<EmployeeTransferred, _, _>(|mut employee: Employee, event, _| async move {
                employee.role = event.role;
                Ok(ProjectionResult::Replace(employee))
            })
            .on::<EmployeeRetired, _, _>(|_, _, _| async { Ok(ProjectionResult::Delete) })
            .resolve_update(|received: Employee, current: Employee, context| async move {
                if received.name != current.name {
                    bail!("employees cannot be renamed");
                }
                Ok(vec![context.event(&EmployeeTransferred {
                    role: received.role,
                })?])
            })
            .resolve_deletion(|_, context| async move { Ok(vec![context.event(&EmployeeRetired)?]) })
            .build(event_types())
            .unwrap()
    }

    #[tokio::test]
    async fn updates_resolve_into_typed_events() {
        let request = EmbeddingRequest::Compare {
            key: "bob".to_string(),
            received_state: json!({ "name": "Bob", "role": "Chef" }),
            current_state: Some(json!({ "name": "Bob", "role": "Waiter" })),
        };

        let outcome = embedding().process(request, request_context()).await.unwrap();

        let EmbeddingOutcome::Events { events } = outcome else {
            panic!("expected events, got {outcome:?}");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), &event_type(2));
        assert_eq!(events[0].event_source_id().as_str(), "bob");
        assert_eq!(events[0].content(), &json!({ "role": "Chef" }));
    }

    #[tokio::test]
    async fn deletions_resolve_into_typed_events() {
        let request = EmbeddingRequest::Delete {
            key: "bob".to_string(),
            current_state: json!({ "name": "Bob", "role": "Chef" }),
        };

        let outcome = embedding().process(request, request_context()).await.unwrap();

        assert!(matches!(
            outcome,
            EmbeddingOutcome::Events { ref events } if events[0].event_type() == &event_type(3)
        ));
    }

    #[tokio::test]
    async fn resolver_errors_are_handler_failures() {
        let request = EmbeddingRequest::Compare {
            key: "bob".to_string(),
            received_state: json!({ "name": "Robert", "role": "Chef" }),
            current_state: Some(json!({ "name": "Bob", "role": "Chef" })),
        };

        assert!(matches!(
            embedding().process(request, request_context()).await,
            Err(RequestFailure::Handler(_))
        ));
    }

    #[tokio::test]
    async fn committed_events_are_projected() {
        let event = CommittedEvent::new(
            1,
            Utc::now(),
            "bob",
            execution_context(),
            event_type(1),
            json!({ "name": "Bob" }),
            false,
        );
        let request = EmbeddingRequest::Projection {
            event,
            key: "bob".to_string(),
            current_state: None,
        };

        let outcome = embedding().process(request, request_context()).await.unwrap();

        assert_eq!(
            outcome,
            EmbeddingOutcome::Replace {
                state: json!({ "name": "Bob", "role": "" })
            }
        );
    }

    #[tokio::test]
    async fn unknown_event_types_are_fatal_for_embeddings() {
        let embedding = embedding();
        let event = CommittedEvent::new(
            1,
            Utc::now(),
            "bob",
            execution_context(),
            event_type(42),
            json!({}),
            false,
        );
        let request = EmbeddingRequest::Projection {
            event,
            key: "bob".to_string(),
            current_state: None,
        };

        assert_eq!(embedding.event_type_of(&request), Some(event_type(42)));
        assert!(embedding.resolution_failures_are_fatal());
        assert!(matches!(
            embedding.process(request, request_context()).await,
            Err(RequestFailure::Resolution(ProcessingError::UnknownEventType { .. }))
        ));
    }

    #[test]
    fn resolvers_are_required() {
        let err = EmbeddingBuilder::new(EmbeddingId::from_u128(9), Employee::default())
            .on::<EmployeeHired, _, _>(|employee: Employee, _, _| async move { Ok(ProjectionResult::Replace(employee)) })
            .build(event_types())
            .unwrap_err();

        assert!(matches!(err, ProcessingError::InvalidRegistration(_)));
    }
}
