use async_trait::async_trait;

use crate::{Address, Member};

/// An opaque agent handle the fabric can dispatch into.
///
/// Actors are modelled as a capability set, not a class hierarchy: anything
/// that can describe itself and service `receive` participates.  `terminate`
/// is optional — the default is a no-op.
#[async_trait]
pub trait Communicable: Send + Sync {
    /// The agent's identity in the local registry.
    fn address(&self) -> Address;

    /// Self-description broadcast to discovery: id, accepted perceptions,
    /// provided capabilities.
    fn member(&self) -> Member;

    /// Service one signal on the named perception.  Input and output are
    /// JSON bytes; the concrete types are agreed out-of-band.
    async fn receive(&self, input: Vec<u8>, perception: &str) -> anyhow::Result<Vec<u8>>;

    async fn terminate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
