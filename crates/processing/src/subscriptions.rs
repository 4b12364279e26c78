//! Event horizon subscriptions: consume public streams of other microservices.

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, instrument};

use kestrel_core::{ExecutionContext, MicroserviceId, PartitionId, ScopeId, TenantId, uuid_newtype};
use kestrel_rpc::{CallShape, Method, ReactiveClient};

use crate::config::ProcessingConfig;
use crate::error::ProcessingError;
use crate::protocol::Failure;
use crate::supervisor::{ProcessorStats, SharedStats, supervise};

uuid_newtype! {
    /// A public stream produced by a microservice.
    pub struct StreamId, "StreamId"
}

uuid_newtype! {
    /// The producer's consent to a subscription.
    pub struct ConsentId, "ConsentId"
}

/// Which public stream partition to receive, and where to store it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub producer_microservice: MicroserviceId,
    pub producer_tenant: TenantId,
    pub producer_stream: StreamId,
    pub partition: Option<PartitionId>,
    pub consumer_scope: ScopeId,
    pub consumer_tenant: TenantId,
}

impl Subscription {
    pub fn new(
        producer_microservice: MicroserviceId,
        producer_tenant: TenantId,
        producer_stream: StreamId,
        partition: PartitionId,
        consumer_scope: ScopeId,
        consumer_tenant: TenantId,
    ) -> Self {
        Self {
            producer_microservice,
            producer_tenant,
            producer_stream,
            partition: Some(partition),
            consumer_scope,
            consumer_tenant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub execution_context: ExecutionContext,
    pub producer_microservice: MicroserviceId,
    pub producer_tenant: TenantId,
    pub producer_stream: StreamId,
    pub partition: PartitionId,
    pub consumer_scope: ScopeId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    #[serde(default)]
    pub consent_id: Option<ConsentId>,
    #[serde(default)]
    pub failure: Option<Failure>,
}

pub const SUBSCRIBE: Method<SubscriptionRequest, SubscriptionResponse> =
    Method::new("kestrel.runtime.eventhorizon.Consumer", "Subscribe", CallShape::Unary);

/// Ask the runtime to subscribe the consumer tenant to `subscription`.
#[instrument(
    skip_all,
    fields(
        producer_microservice = %subscription.producer_microservice,
        producer_stream = %subscription.producer_stream,
        consumer_tenant = %subscription.consumer_tenant,
    )
)]
pub async fn subscribe_to_event_horizon(
    client: &ReactiveClient,
    subscription: &Subscription,
    execution_context: &ExecutionContext,
    cancellation: &CancellationToken,
) -> Result<ConsentId, ProcessingError> {
    let partition = subscription
        .partition
        .ok_or(ProcessingError::MissingPartitionForSubscription {
            producer_stream: subscription.producer_stream,
        })?;

    let request = SubscriptionRequest {
        execution_context: execution_context.clone(),
        producer_microservice: subscription.producer_microservice,
        producer_tenant: subscription.producer_tenant,
        producer_stream: subscription.producer_stream,
        partition,
        consumer_scope: subscription.consumer_scope,
    };

    match client.call_unary(&SUBSCRIBE, &request, cancellation).await? {
        SubscriptionResponse {
            failure: Some(failure),
            ..
        } => Err(ProcessingError::EventHorizonSubscriptionFailed { failure }),
        SubscriptionResponse {
            consent_id: Some(consent),
            ..
        } => {
            info!(consent = %consent, "subscribed");
            Ok(consent)
        }
        SubscriptionResponse { .. } => Err(ProcessingError::protocol(
            "subscription response has neither consent nor failure",
        )),
    }
}

/// Handle to a subscription being established in the background.
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancellation: CancellationToken,
    stats: SharedStats,
    join: JoinHandle<Result<Option<ConsentId>, ProcessingError>>,
}

impl SubscriptionHandle {
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// The consent once subscribed, `None` when cancelled first.
    pub async fn join(self) -> Result<Option<ConsentId>, ProcessingError> {
        self.join
            .await
            .map_err(|e| ProcessingError::TaskFailed(e.to_string()))?
    }
}

/// Subscribe in the background, retrying transient failures.
pub fn start_subscription(
    client: ReactiveClient,
    subscription: Subscription,
    config: ProcessingConfig,
    cancellation: &CancellationToken,
) -> SubscriptionHandle {
    let cancellation = cancellation.child_token();
    let stats = SharedStats::default();
    let span = info_span!("subscription", producer_stream = %subscription.producer_stream);

    let join = tokio::spawn({
        let cancellation = cancellation.clone();
        let stats = stats.clone();
        async move {
            let execution_context = config
                .execution_context
                .for_tenant(subscription.consumer_tenant);
            supervise(&config.retry_policy, &cancellation, &stats, |_| {
                subscribe_to_event_horizon(&client, &subscription, &execution_context, &cancellation)
            })
            .await
        }
        .instrument(span)
    });

    SubscriptionHandle {
        cancellation,
        stats,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FailureId;
    use crate::retry::RetryPolicy;
    use kestrel_core::CorrelationId;
    use kestrel_rpc::InMemoryTransport;
    use std::time::Duration;

    fn subscription() -> Subscription {
        Subscription::new(
            MicroserviceId::from_u128(1),
            TenantId::from_u128(2),
            StreamId::from_u128(3),
            PartitionId::from_u128(4),
            ScopeId::from_u128(5),
            TenantId::from_u128(6),
        )
    }

    fn execution_context() -> ExecutionContext {
        ExecutionContext::new(
            MicroserviceId::from_u128(9),
            TenantId::from_u128(0),
            "1.0.0",
            "test",
            CorrelationId::from_u128(1),
        )
    }

    #[tokio::test]
    async fn missing_partitions_are_rejected_before_calling() {
        let (transport, server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);
        let subscription = Subscription {
            partition: None,
            ..subscription()
        };

        let err = subscribe_to_event_horizon(&client, &subscription, &execution_context(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProcessingError::MissingPartitionForSubscription {
                producer_stream: StreamId::from_u128(3)
            }
        );
        assert_eq!(server.opened_calls(), 0);
    }

    #[tokio::test]
    async fn consent_is_returned() {
        let (transport, mut server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);

        let runtime = tokio::spawn(async move {
            let mut call = server.accept().await.unwrap();
            let request: SubscriptionRequest = call.next_request().await.unwrap().unwrap();
            call.send(&SubscriptionResponse {
                consent_id: Some(ConsentId::from_u128(42)),
                failure: None,
            })
            .unwrap();
            (call.method().path(), request)
        });

        let consent = subscribe_to_event_horizon(&client, &subscription(), &execution_context(), &CancellationToken::new())
            .await
            .unwrap();
        let (path, request) = runtime.await.unwrap();

        assert_eq!(consent, ConsentId::from_u128(42));
        assert_eq!(path, SUBSCRIBE.descriptor().path());
        assert_eq!(request.partition, PartitionId::from_u128(4));
        assert_eq!(request.producer_stream, StreamId::from_u128(3));
    }

    #[tokio::test]
    async fn runtime_failures_are_reported() {
        let (transport, mut server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);

        tokio::spawn(async move {
            let mut call = server.accept().await.unwrap();
            call.send(&SubscriptionResponse {
                consent_id: None,
                failure: Some(Failure::new(FailureId::from_u128(7), "no consent")),
            })
            .unwrap();
        });

        let err = subscribe_to_event_horizon(&client, &subscription(), &execution_context(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessingError::EventHorizonSubscriptionFailed { .. }));
        assert_eq!(err.class(), crate::error::FailureClass::Transient);
    }

    #[tokio::test]
    async fn background_subscriptions_retry_until_consented() {
        let (transport, mut server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);
        let config = ProcessingConfig::default()
            .with_execution_context(execution_context())
            .with_retry_policy(RetryPolicy::fixed(Duration::from_millis(1)));

        let handle = start_subscription(client, subscription(), config, &CancellationToken::new());

        let mut first = server.accept().await.unwrap();
        first
            .send(&SubscriptionResponse {
                consent_id: None,
                failure: Some(Failure::new(FailureId::from_u128(7), "producer busy")),
            })
            .unwrap();

        let mut second = server.accept().await.unwrap();
        let request: SubscriptionRequest = second.next_request().await.unwrap().unwrap();
        second
            .send(&SubscriptionResponse {
                consent_id: Some(ConsentId::from_u128(8)),
                failure: None,
            })
            .unwrap();

        assert_eq!(handle.join().await, Ok(Some(ConsentId::from_u128(8))));
        assert_eq!(request.execution_context.tenant_id(), TenantId::from_u128(6));
    }

    #[tokio::test]
    async fn cancelled_subscriptions_stop_quietly() {
        let (transport, _server) = InMemoryTransport::new();
        let client = ReactiveClient::from_transport(transport);
        let cancellation = CancellationToken::new();

        let handle = start_subscription(client, subscription(), ProcessingConfig::default(), &cancellation);
        cancellation.cancel();

        assert_eq!(handle.join().await, Ok(None));
    }
}
