//! Artifact generations (additive schema evolution without changing identity).

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArtifactError;

/// Natural-number version attached to an artifact identifier.
///
/// The representation is unsigned, so every constructed `Generation` is valid.
/// Conversions from signed or floating-point inputs are fallible and reject
/// negative or non-integral values.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(u32);

impl Generation {
    /// The lowest valid generation, used when none is specified.
    pub const FIRST: Generation = Generation(0);

    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// The following generation, or `None` on overflow.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl core::fmt::Display for Generation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u32> for Generation {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Generation> for u32 {
    fn from(value: Generation) -> Self {
        value.0
    }
}

impl TryFrom<i64> for Generation {
    type Error = ArtifactError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .map(Self)
            .map_err(|_| ArtifactError::invalid_generation(value))
    }
}

impl TryFrom<f64> for Generation {
    type Error = ArtifactError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value.fract() != 0.0 || value < 0.0 || value > u32::MAX as f64 {
            return Err(ArtifactError::invalid_generation(value));
        }
        Ok(Self(value as u32))
    }
}

impl FromStr for Generation {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed: i64 = s
            .trim()
            .parse()
            .map_err(|_| ArtifactError::invalid_generation(s))?;
        Self::try_from(parsed)
    }
}
