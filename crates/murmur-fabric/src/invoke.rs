//! Invocation wire payloads and framing.
//!
//! Wire format per message:
//!   [4 bytes big-endian length][JSON bytes]
//!
//! Arguments and results are opaque JSON bytes; generic type substitutions
//! are erased at the wire, so callers agree on concrete types out-of-band.

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::FabricError;

/// Hard ceiling on a single framed message.
pub const MAX_FRAME_BYTES: usize = 1_000_000;

/// A cross-transport invocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokePayload {
    #[serde(rename = "invocationID")]
    pub invocation_id: String,
    /// Capability identifier the invocation targets.
    pub target: String,
    pub arguments: Vec<u8>,
    /// ISO-8601 creation time.
    pub timestamp: String,
}

impl InvokePayload {
    pub fn new(target: impl Into<String>, arguments: Vec<u8>) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            arguments,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// The matching response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponsePayload {
    #[serde(rename = "invocationID")]
    pub invocation_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<u8>>,
    #[serde(rename = "errorCode", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl InvokeResponsePayload {
    pub fn ok(invocation_id: impl Into<String>, result: Vec<u8>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            success: true,
            result: Some(result),
            error_code: None,
            error_message: None,
        }
    }

    pub fn err(
        invocation_id: impl Into<String>,
        code: InvokeErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            success: false,
            result: None,
            error_code: Some(code.code()),
            error_message: Some(message.into()),
        }
    }
}

/// Canonical error codes carried in `InvokeResponsePayload.errorCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeErrorCode {
    ResourceUnavailable,
    CapabilityNotFound,
    InvocationFailed,
    Timeout,
    SerializationFailed,
    DeserializationFailed,
    InvalidArgument,
    NotFound,
    InternalError,
}

impl InvokeErrorCode {
    /// Stable wire value.
    pub fn code(self) -> i32 {
        match self {
            InvokeErrorCode::ResourceUnavailable => 1,
            InvokeErrorCode::CapabilityNotFound => 2,
            InvokeErrorCode::InvocationFailed => 3,
            InvokeErrorCode::Timeout => 4,
            InvokeErrorCode::SerializationFailed => 5,
            InvokeErrorCode::DeserializationFailed => 6,
            InvokeErrorCode::InvalidArgument => 7,
            InvokeErrorCode::NotFound => 8,
            InvokeErrorCode::InternalError => 9,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => InvokeErrorCode::ResourceUnavailable,
            2 => InvokeErrorCode::CapabilityNotFound,
            3 => InvokeErrorCode::InvocationFailed,
            4 => InvokeErrorCode::Timeout,
            5 => InvokeErrorCode::SerializationFailed,
            6 => InvokeErrorCode::DeserializationFailed,
            7 => InvokeErrorCode::InvalidArgument,
            8 => InvokeErrorCode::NotFound,
            9 => InvokeErrorCode::InternalError,
            _ => return None,
        })
    }
}

// ── Framed JSON helpers ───────────────────────────────────────────────────────

/// Write one length-prefixed JSON message.
pub async fn write_framed<W, T>(io: &mut W, value: &T) -> Result<(), FabricError>
where
    W: AsyncWrite + Unpin + Send,
    T: Serialize,
{
    let payload =
        serde_json::to_vec(value).map_err(|e| FabricError::SerializationFailed(e.to_string()))?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(FabricError::SerializationFailed(format!(
            "message too large: {} bytes",
            payload.len()
        )));
    }
    let len = payload.len() as u32;
    io.write_all(&len.to_be_bytes()).await?;
    io.write_all(&payload).await?;
    io.flush().await?;
    Ok(())
}

/// Read one length-prefixed JSON message.
pub async fn read_framed<R, T>(io: &mut R) -> Result<T, FabricError>
where
    R: AsyncRead + Unpin + Send,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(FabricError::DeserializationFailed(format!(
            "incoming message too large: {len} bytes"
        )));
    }
    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await?;
    serde_json::from_slice(&payload)
        .map_err(|e| FabricError::DeserializationFailed(e.to_string()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_wire_field_names() {
        let p = InvokePayload::new("agent.perception.work", b"{}".to_vec());
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"invocationID\""));
        assert!(json.contains("\"target\":\"agent.perception.work\""));
        assert!(json.contains("\"timestamp\""));
    }

    #[test]
    fn response_error_fields_render_camel_case() {
        let r = InvokeResponsePayload::err("i1", InvokeErrorCode::CapabilityNotFound, "nope");
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"errorCode\":2"));
        assert!(json.contains("\"errorMessage\":\"nope\""));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn error_codes_are_stable_and_reversible() {
        for code in [
            InvokeErrorCode::ResourceUnavailable,
            InvokeErrorCode::CapabilityNotFound,
            InvokeErrorCode::InvocationFailed,
            InvokeErrorCode::Timeout,
            InvokeErrorCode::SerializationFailed,
            InvokeErrorCode::DeserializationFailed,
            InvokeErrorCode::InvalidArgument,
            InvokeErrorCode::NotFound,
            InvokeErrorCode::InternalError,
        ] {
            assert_eq!(InvokeErrorCode::from_code(code.code()), Some(code));
        }
        assert_eq!(InvokeErrorCode::from_code(42), None);
    }

    #[tokio::test]
    async fn framed_round_trip() {
        let payload = InvokePayload::new("agent.perception.work", vec![1, 2, 3]);
        let mut buf = Vec::new();
        write_framed(&mut buf, &payload).await.unwrap();
        // 4-byte big-endian prefix matches the JSON body length.
        let len = u32::from_be_bytes(buf[..4].try_into().unwrap()) as usize;
        assert_eq!(len, buf.len() - 4);

        let mut cursor = std::io::Cursor::new(buf);
        let back: InvokePayload = read_framed(&mut cursor).await.unwrap();
        assert_eq!(back, payload);
    }

    #[tokio::test]
    async fn oversized_incoming_frame_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES as u32 + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let result: Result<InvokePayload, _> = read_framed(&mut cursor).await;
        assert!(matches!(result, Err(FabricError::DeserializationFailed(_))));
    }

    #[tokio::test]
    async fn truncated_frame_is_an_io_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u32.to_be_bytes());
        buf.extend_from_slice(b"short");
        let mut cursor = std::io::Cursor::new(buf);
        let result: Result<InvokePayload, _> = read_framed(&mut cursor).await;
        assert!(matches!(result, Err(FabricError::Io(_))));
    }
}
