use serde::{Deserialize, Serialize};

/// Identifies the source (e.g. aggregate instance) an event was committed for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventSourceId(String);

impl EventSourceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EventSourceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventSourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EventSourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<uuid::Uuid> for EventSourceId {
    fn from(value: uuid::Uuid) -> Self {
        Self(value.to_string())
    }
}
