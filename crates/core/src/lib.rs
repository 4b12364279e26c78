//! `kestrel-core`: foundation building blocks shared by every Kestrel crate.
//!
//! This crate contains identifiers and the execution context only (no IO, no
//! runtime protocol concerns).

pub mod error;
pub mod execution_context;
pub mod id;

pub use error::CoreError;
pub use execution_context::ExecutionContext;
pub use id::{CorrelationId, MicroserviceId, PartitionId, ScopeId, TenantId};
