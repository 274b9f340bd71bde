// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Permission engine.
//!
//! Decides whether a tool invocation is allowed, denied, or requires a
//! prompt.  Patterns are compiled once at configuration build time; checking
//! never compiles and never panics.  The evaluation order implemented in
//! [`PermissionEngine::check`] is a contract: final-deny rules are
//! consulted first and nothing later — session memory, overrides, modes,
//! delegates — can relax them.
mod config;
mod engine;
mod pattern;
mod rule;

pub use config::{DefaultAction, PermissionConfiguration};
pub use engine::{
    CheckContext, PermissionDecision, PermissionDelegate, PermissionEngine, PermissionMode,
    SessionStamp,
};
pub use pattern::{normalize_path, to_canonical_json, ArgPattern, ToolPattern};
pub use rule::{PermissionRule, RuleKind};

/// Re-exported so callers building a [`CheckContext`] need only this crate.
pub use murmur_tools::PermissionLevel;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid rule `{0}`")]
    InvalidRule(String),

    #[error("tool `{tool}` denied and interrupted: {reason}")]
    DeniedAndInterrupt { tool: String, reason: String },

    #[error("permission delegate failed: {0}")]
    Delegate(anyhow::Error),
}
