use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use kestrel_artifacts::EventType;
use kestrel_core::{ExecutionContext, PartitionId};

use crate::committed::{deserialize_content, CommittedEvent};
use crate::error::EventError;
use crate::event_source::EventSourceId;

/// Metadata handed to a handler together with an event's content.
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    sequence_number: u64,
    event_type: EventType,
    event_source_id: EventSourceId,
    occurred: DateTime<Utc>,
    committed_execution_context: ExecutionContext,
    current_execution_context: ExecutionContext,
    partition_id: PartitionId,
    retry_attempt: u32,
}

impl EventContext {
    /// Split a committed event into its content and handler context.
    ///
    /// `current_execution_context` is the context of the processing request
    /// the event was delivered with.
    pub fn from_committed(
        event: CommittedEvent,
        current_execution_context: ExecutionContext,
        partition_id: PartitionId,
        retry_attempt: u32,
    ) -> (serde_json::Value, Self) {
        let context = Self {
            sequence_number: event.event_log_sequence_number(),
            event_type: *event.event_type(),
            event_source_id: event.event_source_id().clone(),
            occurred: event.occurred(),
            committed_execution_context: event.execution_context().clone(),
            current_execution_context,
            partition_id,
            retry_attempt,
        };
        (event.into_content(), context)
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn event_source_id(&self) -> &EventSourceId {
        &self.event_source_id
    }

    pub fn occurred(&self) -> DateTime<Utc> {
        self.occurred
    }

    /// Context the event was committed under.
    pub fn committed_execution_context(&self) -> &ExecutionContext {
        &self.committed_execution_context
    }

    /// Context of the processing request that delivered the event.
    pub fn execution_context(&self) -> &ExecutionContext {
        &self.current_execution_context
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Number of earlier failed attempts at processing this event (0 on first delivery).
    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    /// Deserialize event content into `E`, naming `E` on failure.
    pub fn decode<E: DeserializeOwned>(content: serde_json::Value) -> Result<E, EventError> {
        deserialize_content(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kestrel_artifacts::EventTypeId;
    use kestrel_core::{CorrelationId, MicroserviceId, TenantId};
    use serde::Deserialize;
    use serde_json::json;

    fn execution_context(tenant: u128) -> ExecutionContext {
        ExecutionContext::new(
            MicroserviceId::from_u128(1),
            TenantId::from_u128(tenant),
            "1.0.0",
            "test",
            CorrelationId::from_u128(3),
        )
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct ItemAdded {
        sku: String,
    }

    #[test]
    fn splits_committed_events_into_content_and_context() {
        let occurred = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let event = CommittedEvent::new(
            42,
            occurred,
            "cart-1",
            execution_context(1),
            EventType::first(EventTypeId::from_u128(8)),
            json!({ "sku": "abc" }),
            false,
        );

        let (content, context) =
            EventContext::from_committed(event, execution_context(2), PartitionId::UNSPECIFIED, 0);

        assert_eq!(context.sequence_number(), 42);
        assert_eq!(context.occurred(), occurred);
        assert_eq!(context.event_source_id().as_str(), "cart-1");
        assert_eq!(context.committed_execution_context().tenant_id(), TenantId::from_u128(1));
        assert_eq!(context.execution_context().tenant_id(), TenantId::from_u128(2));
        assert_eq!(
            EventContext::decode::<ItemAdded>(content).unwrap(),
            ItemAdded { sku: "abc".to_string() }
        );
    }

    #[test]
    fn decode_failures_name_the_target_type() {
        let err = EventContext::decode::<ItemAdded>(json!({ "quantity": 1 })).unwrap_err();

        match err {
            EventError::Deserialize { type_name, .. } => assert!(type_name.ends_with("ItemAdded")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
