use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum FabricError {
    #[error("invalid capability identifier: {0}")]
    InvalidCapability(String),

    #[error("member unavailable: {0}")]
    MemberUnavailable(String),

    #[error("member {member} does not provide {capability}")]
    MemberDoesNotProvide { member: String, capability: String },

    #[error("member {member} does not accept perception {perception}")]
    NoAcceptedPerceptions { member: String, perception: String },

    #[error("invocation failed: {0}")]
    InvocationFailed(String),

    #[error("cannot terminate remote member {0}")]
    CannotTerminateRemote(String),

    #[error("member not found: {0}")]
    MemberNotFound(String),

    #[error("process spawn failed: {0}")]
    ProcessSpawnFailed(String),

    #[error("process spawn timed out")]
    ProcessSpawnTimeout,

    #[error("process handshake failed: {0}")]
    ProcessHandshakeFailed(String),

    #[error("community already started")]
    AlreadyStarted,

    #[error("community not started")]
    NotStarted,

    #[error("actor is not local: {0}")]
    ActorNotLocal(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("no transport available")]
    NoTransportAvailable,

    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("operation timed out")]
    Timeout,

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FabricError {
    fn from(e: std::io::Error) -> Self {
        FabricError::Io(e.to_string())
    }
}
