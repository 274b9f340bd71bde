//! In-memory `PeerTransport` — zero wire dependencies, suitable for tests,
//! local demos, and any scenario where communities run in the same process.
//!
//! Multiple transports cloned from the same [`MemoryHub`] share one roster,
//! so two communities constructed in the same test see each other's
//! announcements and can invoke each other's agents.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use super::{IncomingHandler, PeerFilter, PeerTransport};
use crate::{CapabilityId, FabricError, InvokeErrorCode, InvokePayload, Member};

#[derive(Default)]
struct HubInner {
    /// peer id → (membership record, that peer's incoming handler)
    peers: HashMap<String, (Member, Option<IncomingHandler>)>,
}

/// Shared in-process roster.  Clones share the same `Arc<Mutex<…>>`.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport endpoint for one community, identified by `local_id`.
    pub fn transport(&self, local_id: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            local_id: local_id.into(),
            handler: Arc::new(Mutex::new(None)),
            announced: Arc::new(Mutex::new(std::collections::HashSet::new())),
        }
    }

    fn snapshot(&self) -> Vec<Member> {
        self.inner
            .lock()
            .unwrap()
            .peers
            .values()
            .map(|(m, _)| m.clone())
            .collect()
    }
}

/// One community's endpoint on a [`MemoryHub`].
pub struct MemoryTransport {
    hub: MemoryHub,
    local_id: String,
    handler: Arc<Mutex<Option<IncomingHandler>>>,
    /// Member ids this endpoint has announced; used to attach a late-set
    /// incoming handler to records already on the hub.
    announced: Arc<Mutex<std::collections::HashSet<String>>>,
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn discover_all(
        &self,
        _timeout: Duration,
    ) -> Result<BoxStream<'static, Member>, FabricError> {
        Ok(stream::iter(self.hub.snapshot()).boxed())
    }

    async fn discover(
        &self,
        filter: PeerFilter,
        _timeout: Duration,
    ) -> Result<BoxStream<'static, Member>, FabricError> {
        let members = self
            .hub
            .snapshot()
            .into_iter()
            .filter(move |m| filter.matches(m))
            .collect::<Vec<_>>();
        Ok(stream::iter(members).boxed())
    }

    async fn resolve(&self, peer_id: &str) -> Result<Option<Member>, FabricError> {
        Ok(self
            .hub
            .inner
            .lock()
            .unwrap()
            .peers
            .get(peer_id)
            .map(|(m, _)| m.clone()))
    }

    async fn invoke(
        &self,
        capability: &CapabilityId,
        peer_id: &str,
        arguments: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, FabricError> {
        let handler = {
            let inner = self.hub.inner.lock().unwrap();
            match inner.peers.get(peer_id) {
                None => return Err(FabricError::MemberNotFound(peer_id.to_string())),
                Some((_, None)) => {
                    return Err(FabricError::MemberUnavailable(peer_id.to_string()))
                }
                Some((_, Some(handler))) => Arc::clone(handler),
            }
        };

        let payload = InvokePayload::new(capability.as_str(), arguments);
        let response = tokio::time::timeout(timeout, handler(payload, self.local_id.clone()))
            .await
            .map_err(|_| FabricError::Timeout)?;

        if response.success {
            Ok(response.result.unwrap_or_default())
        } else {
            let message = response.error_message.unwrap_or_else(|| "unknown".into());
            Err(match response.error_code.and_then(InvokeErrorCode::from_code) {
                Some(InvokeErrorCode::CapabilityNotFound) => {
                    FabricError::MemberDoesNotProvide {
                        member: peer_id.to_string(),
                        capability: capability.as_str().to_string(),
                    }
                }
                Some(InvokeErrorCode::Timeout) => FabricError::Timeout,
                _ => FabricError::InvocationFailed(message),
            })
        }
    }

    async fn announce(&self, member: Member) -> Result<(), FabricError> {
        let handler = self.handler.lock().unwrap().clone();
        self.announced.lock().unwrap().insert(member.id.clone());
        self.hub
            .inner
            .lock()
            .unwrap()
            .peers
            .insert(member.id.clone(), (member, handler));
        Ok(())
    }

    async fn withdraw(&self, peer_id: &str) -> Result<(), FabricError> {
        self.announced.lock().unwrap().remove(peer_id);
        self.hub.inner.lock().unwrap().peers.remove(peer_id);
        Ok(())
    }

    fn set_incoming_handler(&self, handler: IncomingHandler) {
        *self.handler.lock().unwrap() = Some(handler.clone());
        // Back-fill the handler onto records this endpoint announced before
        // registration.
        let announced = self.announced.lock().unwrap().clone();
        let mut inner = self.hub.inner.lock().unwrap();
        for id in announced {
            if let Some((_, slot)) = inner.peers.get_mut(&id) {
                if slot.is_none() {
                    *slot = Some(handler.clone());
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
