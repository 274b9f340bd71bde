use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::capability::PERCEPTION_PREFIX;
use crate::{Address, CapabilityId, Communicable};

struct RegistryInner {
    /// address hex → live agent handle
    actors: HashMap<String, Arc<dyn Communicable>>,
    /// capability string → address that services it
    capabilities: HashMap<String, Address>,
}

/// The local actor registry.
///
/// A single mutex-guarded record owns both maps; every reader and writer
/// goes through it.  Locality lives here — addresses themselves carry no
/// routing information.
pub struct ActorRegistry {
    inner: Mutex<RegistryInner>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                actors: HashMap::new(),
                capabilities: HashMap::new(),
            }),
        }
    }

    /// A fresh random address for an actor about to join.
    pub fn assign_id(&self) -> Address {
        Address::random()
    }

    /// Install a live agent: the handle under its address, plus a capability
    /// binding for each perception it accepts and each capability it
    /// provides.
    pub fn actor_ready(&self, agent: Arc<dyn Communicable>) {
        let address = agent.address();
        let member = agent.member();
        let mut inner = self.inner.lock().unwrap();
        inner.actors.insert(address.to_hex(), agent);
        for perception in &member.accepts {
            inner
                .capabilities
                .insert(format!("{PERCEPTION_PREFIX}{perception}"), address);
        }
        for capability in &member.provides {
            inner.capabilities.insert(capability.clone(), address);
        }
        debug!(address = %address, member = %member.id, "actor ready");
    }

    /// Remove the actor and every capability binding pointing at it.
    pub fn resign_id(&self, address: &Address) {
        let mut inner = self.inner.lock().unwrap();
        inner.actors.remove(&address.to_hex());
        inner.capabilities.retain(|_, bound| bound != address);
    }

    /// The live handle for `address`, if the actor is local.
    pub fn resolve(&self, address: &Address) -> Option<Arc<dyn Communicable>> {
        self.inner.lock().unwrap().actors.get(&address.to_hex()).cloned()
    }

    /// The address servicing `capability`, if bound locally.
    pub fn address_of(&self, capability: &str) -> Option<Address> {
        self.inner.lock().unwrap().capabilities.get(capability).copied()
    }

    /// Bind an extra capability to an existing address.
    pub fn bind_capability(&self, capability: CapabilityId, address: Address) {
        self.inner
            .lock()
            .unwrap()
            .capabilities
            .insert(capability.as_str().to_string(), address);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::Member;

    struct DummyAgent {
        address: Address,
        member: Member,
    }

    #[async_trait]
    impl Communicable for DummyAgent {
        fn address(&self) -> Address {
            self.address
        }
        fn member(&self) -> Member {
            self.member.clone()
        }
        async fn receive(&self, input: Vec<u8>, _perception: &str) -> anyhow::Result<Vec<u8>> {
            Ok(input)
        }
    }

    fn agent(id: &str, accepts: &[&str]) -> Arc<DummyAgent> {
        Arc::new(DummyAgent {
            address: Address::random(),
            member: Member::new(id).accepting(accepts.iter().copied()),
        })
    }

    #[test]
    fn ready_then_resolve() {
        let registry = ActorRegistry::new();
        let a = agent("a", &["work"]);
        registry.actor_ready(a.clone());
        assert!(registry.resolve(&a.address()).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_unknown_is_none() {
        let registry = ActorRegistry::new();
        assert!(registry.resolve(&Address::random()).is_none());
    }

    #[test]
    fn perceptions_bind_as_capabilities() {
        let registry = ActorRegistry::new();
        let a = agent("a", &["work", "chat"]);
        registry.actor_ready(a.clone());
        assert_eq!(
            registry.address_of("agent.perception.work"),
            Some(a.address())
        );
        assert_eq!(
            registry.address_of("agent.perception.chat"),
            Some(a.address())
        );
        assert_eq!(registry.address_of("agent.perception.other"), None);
    }

    #[test]
    fn provided_capabilities_bind_too() {
        let registry = ActorRegistry::new();
        let a = Arc::new(DummyAgent {
            address: Address::random(),
            member: Member::new("svc").providing(["agent.action.git"]),
        });
        registry.actor_ready(a.clone());
        assert_eq!(registry.address_of("agent.action.git"), Some(a.address()));
    }

    #[test]
    fn resign_removes_actor_and_bindings() {
        let registry = ActorRegistry::new();
        let a = agent("a", &["work"]);
        registry.actor_ready(a.clone());
        registry.resign_id(&a.address());
        assert!(registry.resolve(&a.address()).is_none());
        assert_eq!(registry.address_of("agent.perception.work"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn resign_leaves_other_actors_untouched() {
        let registry = ActorRegistry::new();
        let a = agent("a", &["work"]);
        let b = agent("b", &["review"]);
        registry.actor_ready(a.clone());
        registry.actor_ready(b.clone());
        registry.resign_id(&a.address());
        assert!(registry.resolve(&b.address()).is_some());
        assert_eq!(
            registry.address_of("agent.perception.review"),
            Some(b.address())
        );
    }

    #[test]
    fn bind_capability_manually() {
        let registry = ActorRegistry::new();
        let address = registry.assign_id();
        registry.bind_capability(
            CapabilityId::parse("agent.action.deploy").unwrap(),
            address,
        );
        assert_eq!(registry.address_of("agent.action.deploy"), Some(address));
    }
}
