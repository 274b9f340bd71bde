use std::fmt;

use serde::{Deserialize, Serialize};

use crate::FabricError;

/// Prefix under which agent perceptions are addressable over the wire.
pub const PERCEPTION_PREFIX: &str = "agent.perception.";

/// A dotted, namespaced capability identifier, e.g. `agent.perception.work`.
///
/// At least two non-empty dot-separated segments of `[A-Za-z0-9_-]`;
/// round-trips through its string form.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityId {
    raw: String,
}

impl CapabilityId {
    pub fn parse(text: &str) -> Result<Self, FabricError> {
        let segments: Vec<&str> = text.split('.').collect();
        if segments.len() < 2 {
            return Err(FabricError::InvalidCapability(text.to_string()));
        }
        for segment in &segments {
            if segment.is_empty()
                || !segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(FabricError::InvalidCapability(text.to_string()));
            }
        }
        Ok(Self {
            raw: text.to_string(),
        })
    }

    /// The capability addressing a perception: `agent.perception.<name>`.
    pub fn perception(name: &str) -> Result<Self, FabricError> {
        Self::parse(&format!("{PERCEPTION_PREFIX}{name}"))
    }

    /// The perception name, when this capability addresses one.
    pub fn perception_name(&self) -> Option<&str> {
        self.raw.strip_prefix(PERCEPTION_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityId({})", self.raw)
    }
}

impl TryFrom<String> for CapabilityId {
    type Error = FabricError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CapabilityId> for String {
    fn from(value: CapabilityId) -> Self {
        value.raw
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
