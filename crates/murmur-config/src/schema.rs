// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so a named function is required for enabled-by-default
/// fields.
fn default_true() -> bool {
    true
}

fn default_tool_timeout_secs() -> u64 {
    120
}

fn default_completed_turn_capacity() -> usize {
    1024
}

fn default_discovery_interval_secs() -> u64 {
    5
}

fn default_invoke_timeout_secs() -> u64 {
    30
}

/// A configuration value failed validation.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("temperature {0} out of range [0, 2]")]
    TemperatureOutOfRange(f32),

    #[error("top_p {0} out of range [0, 1]")]
    TopPOutOfRange(f32),

    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
}

/// Sampling options forwarded to the language model provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfiguration {
    /// Cap on generated tokens; `None` leaves the provider default.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature, valid range [0, 2].
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff, valid range [0, 1].
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl ModelConfiguration {
    /// Reject out-of-range sampling parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::TemperatureOutOfRange(t));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::TopPOutOfRange(p));
            }
        }
        Ok(())
    }
}

/// Which tools an agent may carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolAccess {
    /// No tools at all.
    #[default]
    Disabled,
    /// A named preset registered by the embedding application.
    Preset { name: String },
    /// Exactly these tools, in registration order.
    Custom { tools: Vec<String> },
    /// Any registered tool whose name appears in the list.
    Allowlist { tools: Vec<String> },
}

impl ToolAccess {
    /// `true` when `tool` may be offered to the model under this access mode.
    ///
    /// `Preset` resolution is the embedding application's concern; from the
    /// core's perspective a preset admits every registered tool.
    pub fn admits(&self, tool: &str) -> bool {
        match self {
            ToolAccess::Disabled => false,
            ToolAccess::Preset { .. } => true,
            ToolAccess::Custom { tools } | ToolAccess::Allowlist { tools } => {
                tools.iter().any(|t| t == tool)
            }
        }
    }
}

/// Runner and fabric tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub model: ModelConfiguration,

    /// Per-tool wall-clock deadline when the tool declares none, in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub default_tool_timeout_secs: u64,

    /// How many completed turn ids the idempotency cache remembers.
    #[serde(default = "default_completed_turn_capacity")]
    pub completed_turn_capacity: usize,

    /// Interval between peer-discovery refreshes, in seconds.
    #[serde(default = "default_discovery_interval_secs")]
    pub discovery_interval_secs: u64,

    /// Deadline for a remote invocation, in seconds.
    #[serde(default = "default_invoke_timeout_secs")]
    pub invoke_timeout_secs: u64,

    /// Whether permission checks remember per-session always-allow /
    /// always-block stamps.
    #[serde(default = "default_true")]
    pub enable_session_memory: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            model: ModelConfiguration::default(),
            default_tool_timeout_secs: default_tool_timeout_secs(),
            completed_turn_capacity: default_completed_turn_capacity(),
            discovery_interval_secs: default_discovery_interval_secs(),
            invoke_timeout_secs: default_invoke_timeout_secs(),
            enable_session_memory: default_true(),
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        if self.completed_turn_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("completed_turn_capacity"));
        }
        Ok(())
    }

    pub fn default_tool_timeout(&self) -> Duration {
        Duration::from_secs(self.default_tool_timeout_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
