// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How much damage a tool can do.  Totally ordered so configurations can set
/// a ceiling: an invocation fails when its tool's level exceeds the ceiling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    /// Inspects state, never changes it.
    ReadOnly,
    /// Ordinary side effects inside the working directory.
    #[default]
    Standard,
    /// Side effects beyond the working directory (network, env).
    Elevated,
    /// Irreversible or system-level effects.
    Dangerous,
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// The result of executing a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Plain-text content, always renderable into a prompt fragment.
    pub content: String,
    /// If true, the tool execution failed non-fatally (returned error message).
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful plain-text result.
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Error result containing a plain-text error message.
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            content: msg.into(),
            is_error: true,
        }
    }

    /// Canonical text projection used when splicing the output into a prompt.
    pub fn render(&self) -> &str {
        &self.content
    }
}

/// Trait that every built-in and user-defined tool must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Declared permission level; checked against the configured ceiling.
    fn permission_level(&self) -> PermissionLevel {
        PermissionLevel::Standard
    }

    /// `true` when the tool only inspects state.  Plan mode admits exactly
    /// these tools.
    fn read_only(&self) -> bool {
        self.permission_level() == PermissionLevel::ReadOnly
    }

    /// `true` when the tool edits files.  Accept-edits mode admits these
    /// without prompting.
    fn mutates_files(&self) -> bool {
        false
    }

    /// Execute the tool.  Non-fatal failures should be reported through
    /// [`ToolOutput::err`]; hard errors propagate to the error hooks.
    async fn call(&self, args: Value) -> anyhow::Result<ToolOutput>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
