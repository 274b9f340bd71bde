// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Transport schema between a client and the turn runner.
//!
//! All types derive `Serialize`/`Deserialize` and are encoded as JSON on the
//! wire.  `turn_id` is the idempotency key across requests and events.
//!
//! # Typical turn flow
//!
//! ```text
//! Client                              Runner
//!    │                                   │
//!    │── {turn_id, text} ───────────────►│  runStarted
//!    │                                   │  ... tokenDelta / toolCall* ...
//!    │◄─ runStarted ──────────────────────│
//!    │◄─ toolCallStarted ─────────────────│
//!    │◄─ toolCallCompleted ───────────────│
//!    │◄─ runCompleted {completed} ────────│
//!    │                                   │
//!    │── {turn_id, cancel} ─────────────►│  (idempotent; absorbed if the
//!    │                                   │   turn already completed)
//! ```
use serde::{Deserialize, Serialize};

/// Warning code emitted when an approval response arrives and no approval
/// handler is registered.
pub const APPROVAL_HANDLER_MISSING: &str = "APPROVAL_HANDLER_MISSING";

/// A client request addressed to one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub turn_id: String,
    #[serde(flatten)]
    pub input: RunInput,
}

impl RunRequest {
    pub fn text(turn_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            input: RunInput::Text { text: text.into() },
        }
    }

    pub fn cancel(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            input: RunInput::Cancel,
        }
    }
}

/// What the request asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunInput {
    /// Start the turn with this user input.
    Text { text: String },
    /// Cancel the turn (pre-emptively if its text has not arrived yet).
    Cancel,
    /// Answer to a pending tool-approval prompt.
    ApprovalResponse { id: String, approved: bool },
}

/// Terminal status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// A hook ended the turn early.
    Stopped,
    Cancelled,
    Failed,
}

/// Events the runner emits for a turn, in order: `runStarted`, any number of
/// deltas / tool events / warnings, then exactly one `runCompleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RunEvent {
    RunStarted {
        turn_id: String,
    },
    TokenDelta {
        turn_id: String,
        text: String,
    },
    ToolCallStarted {
        turn_id: String,
        tool: String,
    },
    ToolCallCompleted {
        turn_id: String,
        tool: String,
        duration_ms: u64,
        /// Size-redacted output fingerprint (`<len>:<sha256 prefix>`).
        fingerprint: String,
    },
    /// Non-fatal condition the client should know about.
    Warning {
        turn_id: String,
        code: String,
        message: String,
    },
    RunCompleted {
        turn_id: String,
        status: RunStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        final_output: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
}

impl RunEvent {
    pub fn turn_id(&self) -> &str {
        match self {
            RunEvent::RunStarted { turn_id }
            | RunEvent::TokenDelta { turn_id, .. }
            | RunEvent::ToolCallStarted { turn_id, .. }
            | RunEvent::ToolCallCompleted { turn_id, .. }
            | RunEvent::Warning { turn_id, .. }
            | RunEvent::RunCompleted { turn_id, .. } => turn_id,
        }
    }

    /// `true` for the event that ends a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::RunCompleted { .. })
    }

    pub fn completed(
        turn_id: impl Into<String>,
        status: RunStatus,
        final_output: Option<String>,
        error_message: Option<String>,
    ) -> Self {
        RunEvent::RunCompleted {
            turn_id: turn_id.into(),
            status,
            final_output,
            error_message,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
