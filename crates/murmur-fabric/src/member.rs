use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A discoverable peer.
///
/// `id` is unique within a community snapshot.  Equality covers every field,
/// so a membership diff can detect metadata and capability changes as well
/// as availability flips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Perception identifiers this member accepts.
    #[serde(default)]
    pub accepts: BTreeSet<String>,
    /// Capability identifiers this member provides.
    #[serde(default)]
    pub provides: BTreeSet<String>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_available() -> bool {
    true
}

impl Member {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            accepts: BTreeSet::new(),
            provides: BTreeSet::new(),
            available: true,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn accepting(mut self, perceptions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.accepts.extend(perceptions.into_iter().map(Into::into));
        self
    }

    pub fn providing(mut self, capabilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.provides
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn accepts_perception(&self, perception: &str) -> bool {
        self.accepts.contains(perception)
    }

    pub fn provides_capability(&self, capability: &str) -> bool {
        self.provides.contains(capability)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_sets() {
        let m = Member::new("alpha")
            .with_name("Alpha")
            .accepting(["work", "chat"])
            .providing(["agent.action.git"])
            .with_metadata("battery", "0.8");
        assert!(m.accepts_perception("work"));
        assert!(m.accepts_perception("chat"));
        assert!(m.provides_capability("agent.action.git"));
        assert_eq!(m.metadata["battery"], "0.8");
        assert!(m.available);
    }

    #[test]
    fn equality_covers_all_fields() {
        let a = Member::new("x").accepting(["work"]);
        let b = Member::new("x").accepting(["work"]);
        assert_eq!(a, b);
        assert_ne!(a, b.clone().unavailable());
        assert_ne!(a, b.clone().with_metadata("k", "v"));
        assert_ne!(a, Member::new("x").accepting(["other"]));
    }

    #[test]
    fn serde_defaults_available_to_true() {
        let m: Member = serde_json::from_str(r#"{"id":"q"}"#).unwrap();
        assert!(m.available);
        assert!(m.accepts.is_empty());
    }

    #[test]
    fn json_round_trip() {
        let m = Member::new("n").accepting(["a"]).unavailable();
        let back: Member =
            serde_json::from_str(&serde_json::to_string(&m).unwrap()).unwrap();
        assert_eq!(back, m);
    }
}
