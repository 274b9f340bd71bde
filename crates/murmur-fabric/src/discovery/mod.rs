//! Peer-discovery and invocation abstraction.
//!
//! `PeerTransport` is the single seam between the community and whatever
//! carries its traffic — an in-process hub for tests and same-host demos, a
//! LAN discovery protocol, a socket bridge.  The community layers the
//! refresh/diff loop and routing policy on top; transports only move bytes
//! and answer discovery queries.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::{CapabilityId, FabricError, InvokePayload, InvokeResponsePayload, Member};

/// Discovery filter: by accepted perception or provided capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFilter {
    Accepts(String),
    Provides(String),
}

impl PeerFilter {
    pub fn matches(&self, member: &Member) -> bool {
        match self {
            PeerFilter::Accepts(perception) => member.accepts_perception(perception),
            PeerFilter::Provides(capability) => member.provides_capability(capability),
        }
    }
}

/// Services an inbound invocation; must never fail — failures are encoded in
/// the response payload.
pub type IncomingHandler =
    Arc<dyn Fn(InvokePayload, String) -> BoxFuture<'static, InvokeResponsePayload> + Send + Sync>;

/// Transport contract.
///
/// All discovery results are streams so implementations can surface peers
/// incrementally within the timeout window.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Every currently visible peer.
    async fn discover_all(
        &self,
        timeout: Duration,
    ) -> Result<BoxStream<'static, Member>, FabricError>;

    /// Peers matching the filter.
    async fn discover(
        &self,
        filter: PeerFilter,
        timeout: Duration,
    ) -> Result<BoxStream<'static, Member>, FabricError>;

    /// Look up one peer by id.
    async fn resolve(&self, peer_id: &str) -> Result<Option<Member>, FabricError>;

    /// Invoke a capability on a peer and await the raw result bytes.
    async fn invoke(
        &self,
        capability: &CapabilityId,
        peer_id: &str,
        arguments: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, FabricError>;

    /// Publish (or update) this node's membership record.
    async fn announce(&self, member: Member) -> Result<(), FabricError>;

    /// Withdraw this node's membership record.
    async fn withdraw(&self, peer_id: &str) -> Result<(), FabricError>;

    /// Install the handler that services inbound invocations.
    fn set_incoming_handler(&self, handler: IncomingHandler);
}
