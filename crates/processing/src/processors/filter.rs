//! Filters: decide which events go into a stream, and in which partition.

use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use kestrel_artifacts::{EventType, FilterId};
use kestrel_core::{PartitionId, ScopeId};
use kestrel_events::{CommittedEvent, EventContext};

use crate::error::{ProcessingError, RequestFailure};
use crate::processor::{Processor, RequestContext};
use crate::registration::ProcessorRegistration;

type FilterMethod =
    Arc<dyn Fn(JsonValue, EventContext) -> BoxFuture<'static, anyhow::Result<FilterDecision>> + Send + Sync>;

/// An event offered to a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterEventRequest {
    pub event: CommittedEvent,
    pub partition_id: PartitionId,
}

/// What a filter decided for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDecision {
    pub included: bool,
    #[serde(default)]
    pub partition_id: Option<PartitionId>,
}

impl FilterDecision {
    pub fn include() -> Self {
        Self {
            included: true,
            partition_id: None,
        }
    }

    pub fn exclude() -> Self {
        Self {
            included: false,
            partition_id: None,
        }
    }

    pub fn in_partition(mut self, partition_id: PartitionId) -> Self {
        self.partition_id = Some(partition_id);
        self
    }
}

impl From<bool> for FilterDecision {
    fn from(included: bool) -> Self {
        if included {
            Self::include()
        } else {
            Self::exclude()
        }
    }
}

/// Builds a [`Filter`].
pub struct FilterBuilder {
    id: FilterId,
    alias: Option<String>,
    scope: ScopeId,
    partitioned: bool,
    public: bool,
    method: Option<FilterMethod>,
}

impl FilterBuilder {
    /// Private, unpartitioned, in the default scope.
    pub fn new(id: FilterId) -> Self {
        Self {
            id,
            alias: None,
            scope: ScopeId::DEFAULT,
            partitioned: false,
            public: false,
            method: None,
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

    /// Public filters feed streams other microservices can subscribe to.
    /// They must use [`FilterBuilder::partitioned_filter`].
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Include or exclude each event.
    pub fn filter<F, Fut>(mut self, predicate: F) -> Self
    where
        F: Fn(JsonValue, EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.partitioned = false;
        self.method = Some(Arc::new(move |content: JsonValue, context: EventContext| {
            predicate(content, context)
                .map(|included| included.map(FilterDecision::from))
                .boxed()
        }));
        self
    }

    /// Include or exclude each event and pick its partition.
    pub fn partitioned_filter<F, Fut>(mut self, predicate: F) -> Self
    where
        F: Fn(JsonValue, EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<FilterDecision>> + Send + 'static,
    {
        self.partitioned = true;
        self.method = Some(Arc::new(move |content: JsonValue, context: EventContext| {
            predicate(content, context).boxed()
        }));
        self
    }

    pub fn build(self) -> Result<Filter, ProcessingError> {
        let method = self.method.ok_or_else(|| {
            ProcessingError::invalid_registration(format!("filter {} has no predicate", self.id))
        })?;
        if self.public && !self.partitioned {
            return Err(ProcessingError::invalid_registration(format!(
                "public filter {} needs a partitioned predicate",
                self.id
            )));
        }

        let registration = ProcessorRegistration::new(self.id)
            .with_alias(self.alias)
            .in_scope(self.scope)
            .partitioned(self.partitioned)
            .public(self.public);

        Ok(Filter {
            registration,
            method,
        })
    }
}

/// A built filter, ready to be registered.
pub struct Filter {
    registration: ProcessorRegistration,
    method: FilterMethod,
}

impl core::fmt::Debug for Filter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Filter")
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Processor for Filter {
    type Request = FilterEventRequest;
    type Outcome = FilterDecision;

    fn registration(&self) -> &ProcessorRegistration {
        &self.registration
    }

    // Filters see every event in their scope; nothing to resolve.
    fn event_type_of(&self, _request: &FilterEventRequest) -> Option<EventType> {
        None
    }

    async fn process(
        &self,
        request: FilterEventRequest,
        context: RequestContext,
    ) -> Result<FilterDecision, RequestFailure> {
        let retry_attempt = context.retry_attempt();
        let (content, event_context) = EventContext::from_committed(
            request.event,
            context.execution_context,
            request.partition_id,
            retry_attempt,
        );

        let decision = (self.method)(content, event_context).await?;
        if self.registration.is_partitioned() && decision.partition_id.is_none() {
            return Err(anyhow!("partitioned filter {} returned no partition", self.registration.id()).into());
        }
        Ok(decision)
    }
}
