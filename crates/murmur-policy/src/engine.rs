// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use murmur_tools::PermissionLevel;

use crate::config::{DefaultAction, PermissionConfiguration};
use crate::pattern::to_canonical_json;
use crate::PolicyError;

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allowed,
    /// Allowed, with the arguments rewritten to this JSON text.
    AllowedWithModifiedInput(String),
    Denied(Option<String>),
    AskRequired,
}

/// Global permission posture for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionMode {
    #[default]
    Default,
    /// Allow everything the final-deny list and level ceiling do not forbid.
    BypassPermissions,
    /// Read-only tools run; everything else is denied.
    Plan,
    /// File-mutating tools run without prompting; others fall through.
    AcceptEdits,
}

/// Per-check facts about the tool being invoked, supplied by the caller.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext {
    /// Declared permission level of the tool.
    pub level: PermissionLevel,
    /// `true` when the tool only inspects state.
    pub read_only: bool,
    /// `true` when the tool edits files.
    pub mutates_files: bool,
    /// Highest tool level the configuration admits.
    pub ceiling: PermissionLevel,
    pub mode: PermissionMode,
}

impl Default for CheckContext {
    fn default() -> Self {
        Self {
            level: PermissionLevel::Standard,
            read_only: false,
            mutates_files: false,
            ceiling: PermissionLevel::Dangerous,
            mode: PermissionMode::Default,
        }
    }
}

/// A previously remembered per-session decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStamp {
    AlwaysAllow,
    AlwaysBlock,
}

/// Last-resort policy step before the default action.  May return any of
/// the four decision variants; a hard error propagates to the caller.
#[async_trait]
pub trait PermissionDelegate: Send + Sync {
    async fn evaluate(
        &self,
        tool: &str,
        args: &Value,
        ctx: &CheckContext,
    ) -> anyhow::Result<PermissionDecision>;
}

/// Evaluates tool invocations against a merged configuration.
///
/// The evaluation order in [`check`](PermissionEngine::check) is a contract:
///
/// 1. final-deny rules — nothing later can relax a match
/// 2. session memory
/// 3. override rules
/// 4. deny rules
/// 5. ask rules — force the approval flow before allow is consulted
/// 6. allow rules
/// 7. tool-level ceiling
/// 8. mode (bypass / plan / accept-edits)
/// 9. delegate
/// 10. default action
pub struct PermissionEngine {
    config: PermissionConfiguration,
    delegate: Option<Box<dyn PermissionDelegate>>,
    /// `(tool, canonical args)` → stamp.  Owned by the engine; mutated only
    /// through `stamp` / `reset_session_memory`.
    memory: Mutex<HashMap<(String, String), SessionStamp>>,
}

impl PermissionEngine {
    pub fn new(config: PermissionConfiguration) -> Self {
        Self {
            config,
            delegate: None,
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delegate(mut self, delegate: impl PermissionDelegate + 'static) -> Self {
        self.delegate = Some(Box::new(delegate));
        self
    }

    pub fn config(&self) -> &PermissionConfiguration {
        &self.config
    }

    /// Remember a decision for this `(tool, args)` pair for the rest of the
    /// session.  Final-deny rules still win on later checks.
    pub fn stamp(&self, tool: &str, args: &Value, stamp: SessionStamp) {
        let key = (tool.to_string(), to_canonical_json(args));
        self.memory.lock().unwrap().insert(key, stamp);
    }

    /// Forget all session stamps.  Idempotent.
    pub fn reset_session_memory(&self) {
        self.memory.lock().unwrap().clear();
    }

    /// Build the error for an immediate, turn-fatal denial.
    pub fn deny_and_interrupt(tool: &str, reason: impl Into<String>) -> PolicyError {
        PolicyError::DeniedAndInterrupt {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    /// Evaluate one `(tool, raw argument text)` pair.
    ///
    /// `raw_args` is JSON-decoded here; when decoding fails, argument
    /// patterns fall back to substring matching on the raw text and session
    /// memory / delegates see a JSON string wrapping the raw text.
    pub async fn check(
        &self,
        tool: &str,
        raw_args: &str,
        ctx: &CheckContext,
    ) -> Result<PermissionDecision, PolicyError> {
        let parsed: Option<Value> = serde_json::from_str(raw_args).ok();

        // 1. Final deny — before anything else, relaxed by nothing.
        for rule in &self.config.final_deny {
            if rule.matches(tool, parsed.as_ref(), raw_args) {
                debug!(tool, rule = %rule, "final-deny rule matched");
                return Ok(PermissionDecision::Denied(Some(format!(
                    "final deny rule {rule}"
                ))));
            }
        }

        // 2. Session memory.
        if self.config.enable_session_memory {
            let args_value = parsed
                .clone()
                .unwrap_or_else(|| Value::String(raw_args.to_string()));
            let key = (tool.to_string(), to_canonical_json(&args_value));
            if let Some(stamp) = self.memory.lock().unwrap().get(&key) {
                return Ok(match stamp {
                    SessionStamp::AlwaysAllow => PermissionDecision::Allowed,
                    SessionStamp::AlwaysBlock => {
                        PermissionDecision::Denied(Some("blocked earlier this session".into()))
                    }
                });
            }
        }

        // 3. Overrides bypass deny (but not final-deny).
        for rule in &self.config.overrides {
            if rule.matches(tool, parsed.as_ref(), raw_args) {
                return Ok(PermissionDecision::Allowed);
            }
        }

        // 4. Deny.
        for rule in &self.config.deny {
            if rule.matches(tool, parsed.as_ref(), raw_args) {
                return Ok(PermissionDecision::Denied(Some(format!(
                    "deny rule {rule}"
                ))));
            }
        }

        // 5. Ask — consulted before allow so an ask rule cannot be shadowed
        // by a broader allow.
        for rule in &self.config.ask {
            if rule.matches(tool, parsed.as_ref(), raw_args) {
                return Ok(PermissionDecision::AskRequired);
            }
        }

        // 6. Allow.
        for rule in &self.config.allow {
            if rule.matches(tool, parsed.as_ref(), raw_args) {
                return Ok(PermissionDecision::Allowed);
            }
        }

        // 7. Tool-level ceiling.
        if ctx.level > ctx.ceiling {
            return Ok(PermissionDecision::Denied(Some(format!(
                "tool level {:?} exceeds configured ceiling {:?}",
                ctx.level, ctx.ceiling
            ))));
        }

        // 8. Mode.
        match ctx.mode {
            PermissionMode::BypassPermissions => return Ok(PermissionDecision::Allowed),
            PermissionMode::Plan => {
                return Ok(if ctx.read_only {
                    PermissionDecision::Allowed
                } else {
                    PermissionDecision::Denied(Some("plan mode admits read-only tools".into()))
                });
            }
            PermissionMode::AcceptEdits if ctx.mutates_files => {
                return Ok(PermissionDecision::Allowed);
            }
            _ => {}
        }

        // 9. Delegate.
        if let Some(delegate) = &self.delegate {
            let args_value = parsed.unwrap_or_else(|| Value::String(raw_args.to_string()));
            return delegate
                .evaluate(tool, &args_value, ctx)
                .await
                .map_err(PolicyError::Delegate);
        }

        // 10. Default action.
        Ok(match self.config.default_action {
            Some(DefaultAction::Allow) => PermissionDecision::Allowed,
            Some(DefaultAction::Deny) => PermissionDecision::Denied(None),
            Some(DefaultAction::Ask) | None => PermissionDecision::AskRequired,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
