// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use thiserror::Error;

/// Error taxonomy of the execution core.
///
/// `Cancelled` is never user-visible in a `runCompleted` error message; the
/// runner reflects it as `status = cancelled` instead.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Permission errors ────────────────────────────────────────────────────
    #[error("tool `{tool}` denied{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    PermissionDenied {
        tool: String,
        reason: Option<String>,
    },

    /// Always fatal to the turn; recovery hooks are not consulted.
    #[error("tool `{tool}` denied and interrupted: {reason}")]
    DeniedAndInterrupt { tool: String, reason: String },

    /// Any other failure inside the permission engine (pattern compilation,
    /// delegate errors).
    #[error(transparent)]
    Policy(murmur_policy::PolicyError),

    // ── Hook errors ──────────────────────────────────────────────────────────
    #[error("tool `{tool}` blocked by hook{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    BlockedByHook {
        tool: String,
        reason: Option<String>,
    },

    #[error(transparent)]
    Hook(#[from] murmur_hooks::HookError),

    /// A post-tool or error hook asked the whole turn to stop.
    #[error("stopped by hook: {reason}")]
    StoppedByHook {
        reason: String,
        output: Option<String>,
    },

    // ── Tool errors ──────────────────────────────────────────────────────────
    #[error("tool timed out after {0:?}")]
    Timeout(Duration),

    #[error("tool `{tool}` arguments failed to parse: {error}")]
    ArgumentParseFailed { tool: String, error: String },

    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    /// Internal signal: an error hook supplied a fallback output.  The
    /// pipeline converts this into a success before it escapes.
    #[error("fallback requested")]
    FallbackRequested { output: String },

    #[error("tool failed: {0}")]
    Tool(anyhow::Error),

    // ── Cancellation ─────────────────────────────────────────────────────────
    #[error("cancelled")]
    Cancelled,

    // ── Transport ────────────────────────────────────────────────────────────
    #[error(transparent)]
    Transport(#[from] crate::transport::TransportError),
}

impl CoreError {
    /// `true` for the cooperative-cancellation error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }
}

impl From<murmur_policy::PolicyError> for CoreError {
    fn from(err: murmur_policy::PolicyError) -> Self {
        match err {
            murmur_policy::PolicyError::DeniedAndInterrupt { tool, reason } => {
                CoreError::DeniedAndInterrupt { tool, reason }
            }
            other => CoreError::Policy(other),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
