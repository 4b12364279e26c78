//! Strongly-typed identifiers.
//!
//! Every identifier is a UUID underneath, but each kind lives in its own
//! namespace: a `TenantId` can never be passed where a `ScopeId` is expected.
//! Downstream crates declare their own identifier kinds with [`uuid_newtype!`].

/// Declare a UUID-backed identifier newtype.
///
/// The declaring crate must depend on `serde` and `uuid`.
///
/// ```ignore
/// kestrel_core::uuid_newtype! {
///     /// Identifier of an event type.
///     pub struct EventTypeId, "EventTypeId"
/// }
/// ```
#[macro_export]
macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $vis:vis struct $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Copy,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        #[serde(transparent)]
        $vis struct $t(::uuid::Uuid);

        impl $t {
            /// Create a new random identifier (UUIDv7, time-ordered).
            ///
            /// Prefer passing IDs explicitly in tests for determinism.
            pub fn new() -> Self {
                Self(::uuid::Uuid::now_v7())
            }

            pub const fn from_uuid(uuid: ::uuid::Uuid) -> Self {
                Self(uuid)
            }

            pub const fn from_u128(value: u128) -> Self {
                Self(::uuid::Uuid::from_u128(value))
            }

            pub fn as_uuid(&self) -> &::uuid::Uuid {
                &self.0
            }
        }

        impl ::core::fmt::Display for $t {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::convert::From<::uuid::Uuid> for $t {
            fn from(value: ::uuid::Uuid) -> Self {
                Self(value)
            }
        }

        impl ::core::convert::From<$t> for ::uuid::Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl ::core::str::FromStr for $t {
            type Err = $crate::CoreError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                let uuid = ::uuid::Uuid::parse_str(s)
                    .map_err(|e| $crate::CoreError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

uuid_newtype! {
    /// Identifier of a tenant (multi-tenant boundary).
    pub struct TenantId, "TenantId"
}

uuid_newtype! {
    /// Identifier of a microservice.
    pub struct MicroserviceId, "MicroserviceId"
}

uuid_newtype! {
    /// Identifier of a scope (an isolated event log inside a tenant).
    pub struct ScopeId, "ScopeId"
}

uuid_newtype! {
    /// Identifier of a stream partition.
    pub struct PartitionId, "PartitionId"
}

uuid_newtype! {
    /// Correlation identifier threaded through an execution context.
    pub struct CorrelationId, "CorrelationId"
}

impl ScopeId {
    /// The scope every event log has unless a processor opts into another one.
    pub const DEFAULT: ScopeId = ScopeId::from_uuid(uuid::Uuid::nil());
}

impl PartitionId {
    /// Partition used by unpartitioned processors.
    pub const UNSPECIFIED: PartitionId = PartitionId::from_uuid(uuid::Uuid::nil());
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn parses_and_displays_round_trip() {
        let raw = "8f6ae9a4-ec4e-4b6d-a2e1-5b1c57e2f0a4";
        let tenant = TenantId::from_str(raw).unwrap();

        assert_eq!(tenant.to_string(), raw);
        assert_eq!(uuid::Uuid::from(tenant).to_string(), raw);
    }

    #[test]
    fn parse_failure_names_the_identifier_kind() {
        let err = ScopeId::from_str("not-a-uuid").unwrap_err();

        let crate::CoreError::InvalidId(msg) = err;
        assert!(msg.starts_with("ScopeId"));
    }

    #[test]
    fn default_scope_is_nil() {
        assert_eq!(ScopeId::default(), ScopeId::DEFAULT);
        assert!(ScopeId::DEFAULT.as_uuid().is_nil());
    }

    #[test]
    fn serializes_transparently() {
        let partition = PartitionId::from_u128(42);
        let json = serde_json::to_value(partition).unwrap();

        assert_eq!(json, serde_json::json!(partition.as_uuid().to_string()));
    }
}
