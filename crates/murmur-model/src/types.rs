// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use murmur_config::ModelConfiguration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// A tool result attributed back to the call that produced it.
    pub fn tool_result(call_id: &str, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: format!("[{call_id}] {}", content.into()),
        }
    }
}

/// A transcript plus sampling options, handed to the provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub options: ModelConfiguration,
    pub stream: bool,
}

/// Incremental events produced while the model responds.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// A text chunk streamed from the model.
    TextDelta(String),
    /// The model requests a tool call.  Chunked providers interleave partial
    /// argument text under the same `index`; `id`/`name` arrive once.
    ToolCall {
        index: u32,
        id: String,
        name: String,
        arguments: String,
    },
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
    /// The response is complete.
    Done,
    /// A recoverable provider-side error.
    Error(String),
}

impl Default for Message {
    fn default() -> Self {
        Message::user("")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
