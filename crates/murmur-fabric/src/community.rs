use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::discovery::{IncomingHandler, PeerTransport};
use crate::{
    ActorRegistry, Address, CapabilityId, Communicable, FabricError, InvokeErrorCode,
    InvokePayload, InvokeResponsePayload, Member,
};

/// Membership transitions observed by the discovery diff.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipChange {
    Joined(Member),
    Left(String),
    Updated(Member),
    BecameAvailable(String),
    BecameUnavailable(String),
}

/// The community's membership change stream.
///
/// Single-consumer by design: the stream owns its receiver and caches its
/// continuation across polls, so there is exactly one.  Changes emitted
/// before the stream is taken are buffered, not lost.  When several
/// observers need the same changes, compose
/// [`MembershipStream::fan_out`] on top.
pub struct MembershipStream {
    rx: mpsc::UnboundedReceiver<MembershipChange>,
}

impl MembershipStream {
    /// Await the next change; `None` once the community is gone.
    pub async fn next(&mut self) -> Option<MembershipChange> {
        self.rx.recv().await
    }

    /// Non-blocking poll.
    pub fn try_next(&mut self) -> Option<MembershipChange> {
        self.rx.try_recv().ok()
    }

    /// Adapt the single-consumer stream into a multi-consumer fan-out.
    ///
    /// Consumes the stream and forwards every subsequent change to all
    /// [`MembershipFanout::subscribe`] receivers (lagging receivers drop
    /// oldest entries).
    pub fn fan_out(mut self, capacity: usize) -> MembershipFanout {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let forward_tx = tx.clone();
        let task = tokio::spawn(async move {
            while let Some(change) = self.next().await {
                let _ = forward_tx.send(change);
            }
        });
        MembershipFanout { tx, task }
    }
}

/// Multi-consumer adapter composed atop a [`MembershipStream`].
pub struct MembershipFanout {
    tx: broadcast::Sender<MembershipChange>,
    task: tokio::task::JoinHandle<()>,
}

impl MembershipFanout {
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipChange> {
        self.tx.subscribe()
    }
}

impl Drop for MembershipFanout {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Clone)]
pub struct CommunityConfig {
    /// This community's peer identity on its transports.
    pub local_id: String,
    /// Interval between discovery refreshes.
    pub discovery_interval: Duration,
    /// Deadline for one remote invocation.
    pub invoke_timeout: Duration,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            discovery_interval: Duration::from_secs(5),
            invoke_timeout: Duration::from_secs(30),
        }
    }
}

struct CommunityInner {
    config: CommunityConfig,
    registry: ActorRegistry,
    transports: Vec<Arc<dyn PeerTransport>>,
    /// member id → address, for agents owned by this community.
    local: Mutex<HashMap<String, Address>>,
    /// Last known membership snapshot (local + discovered).
    cache: Mutex<HashMap<String, Member>>,
    /// Child processes spawned through the socket handshake, by member id.
    #[cfg(unix)]
    children: Mutex<HashMap<String, tokio::process::Child>>,
    changes_tx: mpsc::UnboundedSender<MembershipChange>,
}

impl CommunityInner {
    /// Member ids discovery must never evict: local actors and spawned
    /// child processes.
    fn pinned_ids(&self) -> HashSet<String> {
        let mut ids: HashSet<String> = self.local.lock().unwrap().keys().cloned().collect();
        #[cfg(unix)]
        ids.extend(self.children.lock().unwrap().keys().cloned());
        ids
    }
}

/// The set of known agents — local and discovered — plus the routing and
/// lifecycle policy over them.
///
/// The community is the sole mutator of its registry and member cache; all
/// external access goes through it.
pub struct Community {
    inner: Arc<CommunityInner>,
    refresh_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// The one membership change receiver, handed out by [`changes`](Self::changes).
    changes_rx: Mutex<Option<mpsc::UnboundedReceiver<MembershipChange>>>,
}

impl Community {
    pub fn new(config: CommunityConfig) -> Self {
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        Self {
            changes_rx: Mutex::new(Some(changes_rx)),
            inner: Arc::new(CommunityInner {
                config,
                registry: ActorRegistry::new(),
                transports: Vec::new(),
                local: Mutex::new(HashMap::new()),
                cache: Mutex::new(HashMap::new()),
                #[cfg(unix)]
                children: Mutex::new(HashMap::new()),
                changes_tx,
            }),
            refresh_task: Mutex::new(None),
        }
    }

    /// Attach a transport.  Must be called before [`start`](Self::start).
    pub fn with_transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("attach transports before start")
            .transports
            .push(transport);
        self
    }

    pub fn registry(&self) -> &ActorRegistry {
        &self.inner.registry
    }

    /// Install incoming handlers and begin periodic discovery.
    pub fn start(&self) -> Result<(), FabricError> {
        let mut task = self.refresh_task.lock().unwrap();
        if task.is_some() {
            return Err(FabricError::AlreadyStarted);
        }

        for transport in &self.inner.transports {
            let inner = Arc::clone(&self.inner);
            let handler: IncomingHandler = Arc::new(
                move |payload: InvokePayload, sender: String| -> BoxFuture<'static, InvokeResponsePayload> {
                    let inner = Arc::clone(&inner);
                    Box::pin(async move { handle_incoming(inner, payload, sender).await })
                },
            );
            transport.set_incoming_handler(handler);
        }

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            let period = inner.config.discovery_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                refresh(&inner).await;
            }
        }));
        Ok(())
    }

    /// Stop periodic discovery.  Registered agents stay resolvable.
    pub fn stop(&self) -> Result<(), FabricError> {
        match self.refresh_task.lock().unwrap().take() {
            Some(task) => {
                task.abort();
                Ok(())
            }
            None => Err(FabricError::NotStarted),
        }
    }

    /// Install a local agent: registry entry, member cache, and discovery
    /// announcement.
    pub async fn join(&self, agent: Arc<dyn Communicable>) -> Result<Member, FabricError> {
        let member = agent.member();
        let address = agent.address();
        self.inner.registry.actor_ready(agent);
        self.inner
            .local
            .lock()
            .unwrap()
            .insert(member.id.clone(), address);
        self.inner
            .cache
            .lock()
            .unwrap()
            .insert(member.id.clone(), member.clone());
        for transport in &self.inner.transports {
            transport.announce(member.clone()).await?;
        }
        let _ = self
            .inner
            .changes_tx
            .send(MembershipChange::Joined(member.clone()));
        Ok(member)
    }

    /// Remove a local agent and withdraw it from discovery.
    pub async fn leave(&self, member_id: &str) -> Result<(), FabricError> {
        let address = self
            .inner
            .local
            .lock()
            .unwrap()
            .remove(member_id)
            .ok_or_else(|| FabricError::MemberNotFound(member_id.to_string()))?;
        self.inner.registry.resign_id(&address);
        self.inner.cache.lock().unwrap().remove(member_id);
        for transport in &self.inner.transports {
            transport.withdraw(member_id).await?;
        }
        let _ = self
            .inner
            .changes_tx
            .send(MembershipChange::Left(member_id.to_string()));
        Ok(())
    }

    /// Spawn an agent as a child process over a Unix-domain socket and adopt
    /// it into the community.  The handshake (§ wire format in
    /// [`crate::process`]) yields the child's self-description.
    #[cfg(unix)]
    pub async fn spawn_process(
        &self,
        options: &crate::process::SpawnOptions,
    ) -> Result<Member, FabricError> {
        let (child, info) = crate::process::spawn_process_agent(options).await?;
        let member = info.into_member();
        self.inner
            .children
            .lock()
            .unwrap()
            .insert(member.id.clone(), child);
        self.inner
            .cache
            .lock()
            .unwrap()
            .insert(member.id.clone(), member.clone());
        let _ = self
            .inner
            .changes_tx
            .send(MembershipChange::Joined(member.clone()));
        Ok(member)
    }

    /// Terminate a local agent, then remove it.  Remote members cannot be
    /// terminated from here.
    pub async fn terminate(&self, member_id: &str) -> Result<(), FabricError> {
        #[cfg(unix)]
        {
            let child = self.inner.children.lock().unwrap().remove(member_id);
            if let Some(mut child) = child {
                let _ = child.kill().await;
                self.inner.cache.lock().unwrap().remove(member_id);
                let _ = self
                    .inner
                    .changes_tx
                    .send(MembershipChange::Left(member_id.to_string()));
                return Ok(());
            }
        }
        let address = {
            let local = self.inner.local.lock().unwrap();
            match local.get(member_id) {
                Some(address) => *address,
                None if self.inner.cache.lock().unwrap().contains_key(member_id) => {
                    return Err(FabricError::CannotTerminateRemote(member_id.to_string()))
                }
                None => return Err(FabricError::MemberNotFound(member_id.to_string())),
            }
        };
        if let Some(agent) = self.inner.registry.resolve(&address) {
            agent
                .terminate()
                .await
                .map_err(|e| FabricError::InvocationFailed(e.to_string()))?;
        }
        self.leave(member_id).await
    }

    pub fn member(&self, id: &str) -> Option<Member> {
        self.inner.cache.lock().unwrap().get(id).cloned()
    }

    pub fn members(&self) -> Vec<Member> {
        self.inner.cache.lock().unwrap().values().cloned().collect()
    }

    /// Take the membership change stream.
    ///
    /// The stream is single-consumer: the first call takes it, later calls
    /// return `None`.  Compose [`MembershipStream::fan_out`] on top when
    /// several observers need the same changes.
    pub fn changes(&self) -> Option<MembershipStream> {
        self.changes_rx
            .lock()
            .unwrap()
            .take()
            .map(|rx| MembershipStream { rx })
    }

    /// Deliver a signal to `member` on `perception`.
    ///
    /// Local members are called in-process with no wire in between; remote
    /// members go through the first transport that resolves them, under the
    /// configured invocation timeout.
    pub async fn send(
        &self,
        signal: &serde_json::Value,
        to: &Member,
        perception: &str,
    ) -> Result<Vec<u8>, FabricError> {
        if !to.available {
            return Err(FabricError::MemberUnavailable(to.id.clone()));
        }
        if !to.accepts_perception(perception) {
            return Err(FabricError::NoAcceptedPerceptions {
                member: to.id.clone(),
                perception: perception.to_string(),
            });
        }
        let bytes = serde_json::to_vec(signal)
            .map_err(|e| FabricError::SerializationFailed(e.to_string()))?;

        // In-process fast path.
        let local_address = self.inner.local.lock().unwrap().get(&to.id).copied();
        if let Some(address) = local_address {
            let agent = self
                .inner
                .registry
                .resolve(&address)
                .ok_or_else(|| FabricError::ActorNotLocal(to.id.clone()))?;
            return agent
                .receive(bytes, perception)
                .await
                .map_err(|e| FabricError::InvocationFailed(e.to_string()));
        }

        // Remote path: agent.perception.<perception> over the first
        // transport that knows the peer.
        if self.inner.transports.is_empty() {
            return Err(FabricError::NoTransportAvailable);
        }
        let capability = CapabilityId::perception(perception)?;
        for transport in &self.inner.transports {
            if transport.resolve(&to.id).await?.is_some() {
                return transport
                    .invoke(
                        &capability,
                        &to.id,
                        bytes,
                        self.inner.config.invoke_timeout,
                    )
                    .await;
            }
        }
        Err(FabricError::MemberNotFound(to.id.clone()))
    }

    /// One immediate discovery pass (the periodic task does this on its
    /// own; tests and impatient callers can force it).
    pub async fn refresh_now(&self) {
        refresh(&self.inner).await;
    }
}

/// Service one inbound invocation.  Errors never propagate to the
/// transport; they are encoded as response payloads with a stable code.
async fn handle_incoming(
    inner: Arc<CommunityInner>,
    payload: InvokePayload,
    sender: String,
) -> InvokeResponsePayload {
    debug!(target = %payload.target, sender = %sender, "incoming invocation");
    let invocation_id = payload.invocation_id.clone();

    let capability = match CapabilityId::parse(&payload.target) {
        Ok(capability) => capability,
        Err(_) => {
            return InvokeResponsePayload::err(
                invocation_id,
                InvokeErrorCode::InvalidArgument,
                format!("invalid capability `{}`", payload.target),
            )
        }
    };

    let address = match inner.registry.address_of(capability.as_str()) {
        Some(address) => address,
        None => {
            return InvokeResponsePayload::err(
                invocation_id,
                InvokeErrorCode::CapabilityNotFound,
                format!("no local agent services `{capability}`"),
            )
        }
    };

    let agent = match inner.registry.resolve(&address) {
        Some(agent) => agent,
        None => {
            return InvokeResponsePayload::err(
                invocation_id,
                InvokeErrorCode::NotFound,
                format!("agent for `{capability}` is gone"),
            )
        }
    };

    let perception = match capability.perception_name() {
        Some(perception) => perception.to_string(),
        None => {
            return InvokeResponsePayload::err(
                invocation_id,
                InvokeErrorCode::InvalidArgument,
                format!("`{capability}` does not address a perception"),
            )
        }
    };

    match agent.receive(payload.arguments, &perception).await {
        Ok(result) => InvokeResponsePayload::ok(invocation_id, result),
        Err(e) => InvokeResponsePayload::err(
            invocation_id,
            InvokeErrorCode::InvocationFailed,
            e.to_string(),
        ),
    }
}

/// Re-run discovery across all transports and diff against the member
/// cache.  Discovery failures are logged and suppressed — the current
/// membership state is retained.
async fn refresh(inner: &Arc<CommunityInner>) {
    let mut discovered: HashMap<String, Member> = HashMap::new();
    for transport in &inner.transports {
        match transport
            .discover_all(inner.config.discovery_interval)
            .await
        {
            Ok(mut stream) => {
                while let Some(member) = stream.next().await {
                    discovered.insert(member.id.clone(), member);
                }
            }
            Err(e) => {
                warn!(transport = transport.name(), error = %e, "discovery failed");
            }
        }
    }

    let pinned: HashSet<String> = inner.pinned_ids();
    let mut changes = Vec::new();
    {
        let mut cache = inner.cache.lock().unwrap();

        for (id, member) in &discovered {
            if pinned.contains(id) {
                continue;
            }
            match cache.get(id) {
                None => {
                    changes.push(MembershipChange::Joined(member.clone()));
                }
                Some(previous) if previous != member => {
                    if previous.available != member.available {
                        changes.push(if member.available {
                            MembershipChange::BecameAvailable(id.clone())
                        } else {
                            MembershipChange::BecameUnavailable(id.clone())
                        });
                    } else {
                        changes.push(MembershipChange::Updated(member.clone()));
                    }
                }
                Some(_) => {}
            }
            cache.insert(id.clone(), member.clone());
        }

        // Local agents are never marked unavailable or removed by discovery.
        let gone: Vec<String> = cache
            .keys()
            .filter(|id| !pinned.contains(*id) && !discovered.contains_key(*id))
            .cloned()
            .collect();
        for id in gone {
            cache.remove(&id);
            changes.push(MembershipChange::Left(id));
        }
    }

    for change in changes {
        let _ = inner.changes_tx.send(change);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::discovery::memory::MemoryHub;

    struct UpperAgent {
        address: Address,
        member: Member,
    }

    impl UpperAgent {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                address: Address::random(),
                member: Member::new(id).accepting(["work"]),
            })
        }
    }

    #[async_trait]
    impl Communicable for UpperAgent {
        fn address(&self) -> Address {
            self.address
        }
        fn member(&self) -> Member {
            self.member.clone()
        }
        async fn receive(&self, input: Vec<u8>, perception: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::ensure!(perception == "work", "unexpected perception {perception}");
            Ok(String::from_utf8(input)?.to_uppercase().into_bytes())
        }
    }

    fn community(hub: &MemoryHub, id: &str) -> Community {
        Community::new(CommunityConfig {
            local_id: id.to_string(),
            discovery_interval: Duration::from_millis(20),
            invoke_timeout: Duration::from_secs(1),
        })
        .with_transport(Arc::new(hub.transport(id)))
    }

    #[tokio::test]
    async fn start_twice_fails_and_stop_requires_start() {
        let hub = MemoryHub::new();
        let c = community(&hub, "c");
        assert!(matches!(c.stop(), Err(FabricError::NotStarted)));
        c.start().unwrap();
        assert!(matches!(c.start(), Err(FabricError::AlreadyStarted)));
        c.stop().unwrap();
    }

    #[tokio::test]
    async fn join_makes_member_visible_and_emits_change() {
        let hub = MemoryHub::new();
        let c = community(&hub, "c");
        let mut changes = c.changes().unwrap();
        c.join(UpperAgent::new("alpha")).await.unwrap();
        assert!(c.member("alpha").is_some());
        assert!(matches!(
            changes.next().await.unwrap(),
            MembershipChange::Joined(m) if m.id == "alpha"
        ));
    }

    #[tokio::test]
    async fn change_stream_is_single_consumer() {
        let hub = MemoryHub::new();
        let c = community(&hub, "c");
        let first = c.changes();
        assert!(first.is_some());
        assert!(c.changes().is_none());
    }

    #[tokio::test]
    async fn changes_emitted_before_take_are_buffered() {
        let hub = MemoryHub::new();
        let c = community(&hub, "c");
        c.join(UpperAgent::new("early")).await.unwrap();
        let mut changes = c.changes().unwrap();
        assert!(matches!(
            changes.try_next().unwrap(),
            MembershipChange::Joined(m) if m.id == "early"
        ));
    }

    #[tokio::test]
    async fn fan_out_adapter_serves_multiple_observers() {
        let hub = MemoryHub::new();
        let c = community(&hub, "c");
        let fanout = c.changes().unwrap().fan_out(16);
        let mut a = fanout.subscribe();
        let mut b = fanout.subscribe();
        c.join(UpperAgent::new("alpha")).await.unwrap();
        for rx in [&mut a, &mut b] {
            let change = tokio::time::timeout(Duration::from_millis(500), rx.recv())
                .await
                .expect("fan-out should forward the join")
                .unwrap();
            assert!(matches!(change, MembershipChange::Joined(m) if m.id == "alpha"));
        }
    }

    #[tokio::test]
    async fn send_local_dispatches_in_process() {
        let hub = MemoryHub::new();
        let c = community(&hub, "c");
        let member = c.join(UpperAgent::new("alpha")).await.unwrap();
        let out = c
            .send(&serde_json::json!("hello"), &member, "work")
            .await
            .unwrap();
        assert_eq!(out, b"\"HELLO\"");
    }

    #[tokio::test]
    async fn send_checks_availability_and_perceptions() {
        let hub = MemoryHub::new();
        let c = community(&hub, "c");
        let member = c.join(UpperAgent::new("alpha")).await.unwrap();

        let unavailable = member.clone().unavailable();
        assert!(matches!(
            c.send(&serde_json::json!(1), &unavailable, "work").await,
            Err(FabricError::MemberUnavailable(_))
        ));

        assert!(matches!(
            c.send(&serde_json::json!(1), &member, "paint").await,
            Err(FabricError::NoAcceptedPerceptions { .. })
        ));
    }

    #[tokio::test]
    async fn send_remote_routes_through_the_transport() {
        let hub = MemoryHub::new();
        let server = community(&hub, "server");
        server.start().unwrap();
        server.join(UpperAgent::new("worker")).await.unwrap();

        let client = community(&hub, "client");
        let remote = Member::new("worker").accepting(["work"]);
        let out = client
            .send(&serde_json::json!("ping"), &remote, "work")
            .await
            .unwrap();
        assert_eq!(out, b"\"PING\"");
        server.stop().unwrap();
    }

    #[tokio::test]
    async fn send_with_no_transport_fails() {
        let c = Community::new(CommunityConfig::default());
        let remote = Member::new("far").accepting(["work"]);
        assert!(matches!(
            c.send(&serde_json::json!(1), &remote, "work").await,
            Err(FabricError::NoTransportAvailable)
        ));
    }

    #[tokio::test]
    async fn incoming_unknown_capability_yields_error_payload() {
        let hub = MemoryHub::new();
        let server = community(&hub, "server");
        server.start().unwrap();
        server.join(UpperAgent::new("worker")).await.unwrap();

        let client = community(&hub, "client");
        let remote = Member::new("worker").accepting(["paint", "work"]);
        // worker exists but does not accept "paint" locally; the incoming
        // handler reports capability-not-found in the response payload.
        let err = client
            .send(&serde_json::json!(1), &remote, "paint")
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::MemberDoesNotProvide { .. }));
        server.stop().unwrap();
    }

    #[tokio::test]
    async fn discovery_diff_emits_joined_updated_left() {
        let hub = MemoryHub::new();
        let observer = community(&hub, "observer");
        let mut changes = observer.changes().unwrap();

        // Another endpoint announces a peer out-of-band.
        let foreign = hub.transport("foreign");
        foreign
            .announce(Member::new("peer").accepting(["work"]))
            .await
            .unwrap();
        observer.refresh_now().await;
        assert!(matches!(
            changes.try_next().unwrap(),
            MembershipChange::Joined(m) if m.id == "peer"
        ));

        // Availability flip.
        foreign
            .announce(Member::new("peer").accepting(["work"]).unavailable())
            .await
            .unwrap();
        observer.refresh_now().await;
        assert!(matches!(
            changes.try_next().unwrap(),
            MembershipChange::BecameUnavailable(id) if id == "peer"
        ));

        // Metadata change without availability flip.
        foreign
            .announce(
                Member::new("peer")
                    .accepting(["work"])
                    .unavailable()
                    .with_metadata("battery", "0.5"),
            )
            .await
            .unwrap();
        observer.refresh_now().await;
        assert!(matches!(
            changes.try_next().unwrap(),
            MembershipChange::Updated(m) if m.id == "peer"
        ));

        // Withdrawal.
        foreign.withdraw("peer").await.unwrap();
        observer.refresh_now().await;
        assert!(matches!(
            changes.try_next().unwrap(),
            MembershipChange::Left(id) if id == "peer"
        ));
    }

    #[tokio::test]
    async fn local_members_survive_discovery_refresh() {
        let hub = MemoryHub::new();
        let c = community(&hub, "c");
        c.join(UpperAgent::new("alpha")).await.unwrap();
        // Even if a refresh observes nothing for "alpha" (e.g. another
        // process wiped the hub), the local member stays cached and
        // available.
        let foreign = hub.transport("foreign");
        foreign.withdraw("alpha").await.unwrap();
        c.refresh_now().await;
        let member = c.member("alpha").unwrap();
        assert!(member.available);
    }

    #[tokio::test]
    async fn leave_withdraws_and_emits() {
        let hub = MemoryHub::new();
        let c = community(&hub, "c");
        let mut changes = c.changes().unwrap();
        c.join(UpperAgent::new("alpha")).await.unwrap();
        assert!(matches!(
            changes.next().await.unwrap(),
            MembershipChange::Joined(_)
        ));
        c.leave("alpha").await.unwrap();
        assert!(c.member("alpha").is_none());
        assert!(matches!(
            changes.try_next().unwrap(),
            MembershipChange::Left(id) if id == "alpha"
        ));
        assert!(matches!(
            c.leave("alpha").await,
            Err(FabricError::MemberNotFound(_))
        ));
    }

    #[tokio::test]
    async fn terminate_rejects_remote_members() {
        let hub = MemoryHub::new();
        let c = community(&hub, "c");
        // A discovered (non-local) member.
        let foreign = hub.transport("foreign");
        foreign.announce(Member::new("far")).await.unwrap();
        c.refresh_now().await;
        assert!(matches!(
            c.terminate("far").await,
            Err(FabricError::CannotTerminateRemote(_))
        ));
    }

    #[tokio::test]
    async fn periodic_refresh_runs_in_background() {
        let hub = MemoryHub::new();
        let observer = community(&hub, "observer");
        observer.start().unwrap();
        let mut changes = observer.changes().unwrap();

        let foreign = hub.transport("foreign");
        foreign.announce(Member::new("late-peer")).await.unwrap();

        let change = tokio::time::timeout(Duration::from_millis(500), changes.next())
            .await
            .expect("refresh task should discover the peer")
            .unwrap();
        assert!(matches!(change, MembershipChange::Joined(m) if m.id == "late-peer"));
        observer.stop().unwrap();
    }
}
