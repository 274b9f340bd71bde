//! Process-spawn handshake over a Unix-domain socket.
//!
//! The child creates the socket, accepts exactly one connection, reads a
//! length-prefixed `HandshakeRequest`, and replies with a length-prefixed
//! `HandshakeResponse` describing itself.  The parent polls for the socket
//! to appear, connects, and runs the exchange under its own deadlines.
//! Failure at any step terminates the child and unlinks the socket.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::{UnixListener, UnixStream};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::invoke::{read_framed, write_framed};
use crate::{FabricError, Member};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    #[serde(rename = "parentID")]
    pub parent_id: String,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub success: bool,
    #[serde(rename = "agentInfo", default, skip_serializing_if = "Option::is_none")]
    pub agent_info: Option<AgentInfo>,
    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// The child's self-description, folded into a [`Member`] on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub accepts: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl AgentInfo {
    pub fn into_member(self) -> Member {
        let mut member = Member::new(self.id)
            .accepting(self.accepts)
            .providing(self.provides);
        member.name = self.name;
        member.metadata = self.metadata;
        member
    }
}

/// Parent-side spawn parameters.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub command: String,
    pub args: Vec<String>,
    pub socket_path: PathBuf,
    pub parent_id: String,
    pub spawn_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl SpawnOptions {
    pub fn new(
        command: impl Into<String>,
        socket_path: impl Into<PathBuf>,
        parent_id: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            socket_path: socket_path.into(),
            parent_id: parent_id.into(),
            spawn_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Spawn an agent as a child process and run the socket handshake.
///
/// On success the child is returned alongside its self-description; the
/// caller owns the child's lifetime from here.  On any failure the child is
/// killed and the socket unlinked before the error surfaces.
pub async fn spawn_process_agent(
    options: &SpawnOptions,
) -> Result<(Child, AgentInfo), FabricError> {
    let mut child = Command::new(&options.command)
        .args(&options.args)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| FabricError::ProcessSpawnFailed(e.to_string()))?;

    let socket = match wait_for_socket(&options.socket_path, options.spawn_timeout).await {
        Ok(()) => connect_and_handshake(
            &options.socket_path,
            &options.parent_id,
            options.handshake_timeout,
        )
        .await,
        Err(e) => Err(e),
    };

    match socket {
        Ok(info) => Ok((child, info)),
        Err(e) => {
            warn!(error = %e, "process agent handshake failed; terminating child");
            let _ = child.kill().await;
            let _ = std::fs::remove_file(&options.socket_path);
            Err(e)
        }
    }
}

/// Poll until the socket path exists.
async fn wait_for_socket(path: &Path, timeout: Duration) -> Result<(), FabricError> {
    let deadline = tokio::time::Instant::now() + timeout;
    while !path.exists() {
        if tokio::time::Instant::now() >= deadline {
            return Err(FabricError::ProcessSpawnTimeout);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}

/// Parent side of the exchange: connect, send the request, read the reply.
pub async fn connect_and_handshake(
    socket_path: &Path,
    parent_id: &str,
    timeout: Duration,
) -> Result<AgentInfo, FabricError> {
    let exchange = async {
        let mut stream = UnixStream::connect(socket_path)
            .await
            .map_err(|e| FabricError::ProcessHandshakeFailed(e.to_string()))?;
        write_framed(
            &mut stream,
            &HandshakeRequest {
                parent_id: parent_id.to_string(),
                protocol_version: PROTOCOL_VERSION,
            },
        )
        .await?;
        let response: HandshakeResponse = read_framed(&mut stream).await?;
        if !response.success {
            return Err(FabricError::ProcessHandshakeFailed(
                response
                    .error_message
                    .unwrap_or_else(|| "child reported failure".into()),
            ));
        }
        response.agent_info.ok_or_else(|| {
            FabricError::ProcessHandshakeFailed("success response without agentInfo".into())
        })
    };
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| FabricError::ProcessHandshakeFailed("handshake timed out".into()))?
}

/// Child side: create the socket, accept one connection, answer the
/// handshake.  Returns the parent's request.
pub async fn serve_handshake(
    socket_path: &Path,
    agent_info: AgentInfo,
) -> Result<HandshakeRequest, FabricError> {
    // A stale socket from a crashed predecessor would make bind fail.
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    debug!(path = %socket_path.display(), "awaiting parent handshake");

    let (mut stream, _addr) = listener.accept().await?;
    let request: HandshakeRequest = read_framed(&mut stream).await?;
    write_framed(
        &mut stream,
        &HandshakeResponse {
            success: true,
            agent_info: Some(agent_info),
            error_message: None,
        },
    )
    .await?;
    Ok(request)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
