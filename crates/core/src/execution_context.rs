//! Execution context carried alongside every runtime interaction.

use serde::{Deserialize, Serialize};

use crate::id::{CorrelationId, MicroserviceId, TenantId};

/// Who is executing, on behalf of which tenant, and under which correlation.
///
/// The SDK sends its own context with each registration and receives the
/// runtime's context with each processing request. Handlers get it passed
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    microservice_id: MicroserviceId,
    tenant_id: TenantId,
    version: String,
    environment: String,
    correlation_id: CorrelationId,
}

impl ExecutionContext {
    pub fn new(
        microservice_id: MicroserviceId,
        tenant_id: TenantId,
        version: impl Into<String>,
        environment: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            microservice_id,
            tenant_id,
            version: version.into(),
            environment: environment.into(),
            correlation_id,
        }
    }

    pub fn microservice_id(&self) -> MicroserviceId {
        self.microservice_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Same context, acting for another tenant.
    pub fn for_tenant(&self, tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            ..self.clone()
        }
    }

    /// Same context, under a fresh correlation.
    pub fn with_correlation(&self, correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            ..self.clone()
        }
    }
}
