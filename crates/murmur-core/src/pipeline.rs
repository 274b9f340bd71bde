// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool execution pipeline.
//!
//! For one call: permission check, pre-tool hooks, the invocation itself
//! under a deadline with retry, then post-tool hooks.  Cancellation is
//! checkpointed before the permission check, before the invocation, and
//! before the post-hooks; a tool that never polls is only interrupted by its
//! timeout.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use murmur_hooks::{HookChain, HookContext, HookDecision, HookEvent};
use murmur_policy::{CheckContext, PermissionDecision, PermissionEngine, PermissionLevel, PermissionMode};
use murmur_tools::{ToolOutput, ToolRegistry};

use crate::bus::{names, Event, EventBus, EventScope};
use crate::cancel::check_cancellation;
use crate::CoreError;

// ── Retry policy ──────────────────────────────────────────────────────────────

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential(f64),
}

/// Retry configuration for tool-native errors.
///
/// `delay(n)` is the pause after the n-th failed attempt (1-based):
/// fixed `base`, linear `base * n`, exponential `base * m^(n-1)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(100),
            strategy: BackoffStrategy::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay * attempt,
            BackoffStrategy::Exponential(multiplier) => {
                let factor = multiplier.powi(attempt as i32 - 1);
                self.base_delay.mul_f64(factor)
            }
        }
    }
}

// ── Invocation ledger ─────────────────────────────────────────────────────────

/// Per-turn record of one tool invocation.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub call_id: String,
    pub tool: String,
    pub attempts: u32,
    /// Short outcome label once the invocation finished.
    pub outcome: Option<String>,
}

/// Per-turn invocation record, shared by every tool call of the turn so
/// retries and deduplication have stable identities.
#[derive(Debug, Default)]
pub struct InvocationLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl InvocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt for `call_id`, creating the entry on first sight.
    pub fn record_attempt(&self, call_id: &str, tool: &str) {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|e| e.call_id == call_id) {
            Some(entry) => entry.attempts += 1,
            None => entries.push(LedgerEntry {
                call_id: call_id.to_string(),
                tool: tool.to_string(),
                attempts: 1,
                outcome: None,
            }),
        }
    }

    pub fn record_outcome(&self, call_id: &str, outcome: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.iter_mut().find(|e| e.call_id == call_id) {
            entry.outcome = Some(outcome.to_string());
        }
    }

    pub fn entry(&self, call_id: &str) -> Option<LedgerEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.call_id == call_id)
            .cloned()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }
}

// ── Approval seam ─────────────────────────────────────────────────────────────

/// Resolves `ask` outcomes from the permission engine or hook chain.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn approve(&self, tool: &str, args: &str) -> bool;
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct ToolPipelineBuilder {
    registry: Arc<ToolRegistry>,
    permissions: Arc<PermissionEngine>,
    hooks: Arc<HookChain>,
    bus: Arc<EventBus>,
    default_timeout: Duration,
    per_tool_timeouts: HashMap<String, Duration>,
    retry: RetryPolicy,
    mode: PermissionMode,
    ceiling: PermissionLevel,
    approval: Option<Arc<dyn ApprovalHandler>>,
}

impl ToolPipelineBuilder {
    pub fn timeout(mut self, value: Duration) -> Self {
        self.default_timeout = value;
        self
    }

    pub fn tool_timeout(mut self, tool: impl Into<String>, value: Duration) -> Self {
        self.per_tool_timeouts.insert(tool.into(), value);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn mode(mut self, mode: PermissionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn ceiling(mut self, ceiling: PermissionLevel) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn approval(mut self, handler: impl ApprovalHandler + 'static) -> Self {
        self.approval = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> ToolPipeline {
        ToolPipeline {
            registry: self.registry,
            permissions: self.permissions,
            hooks: self.hooks,
            bus: self.bus,
            default_timeout: self.default_timeout,
            per_tool_timeouts: self.per_tool_timeouts,
            retry: self.retry,
            mode: self.mode,
            ceiling: self.ceiling,
            approval: self.approval,
        }
    }
}

/// Composes the permission engine and hook chain with timeout, retry, and
/// cancellation around a single tool call.
pub struct ToolPipeline {
    registry: Arc<ToolRegistry>,
    permissions: Arc<PermissionEngine>,
    hooks: Arc<HookChain>,
    bus: Arc<EventBus>,
    default_timeout: Duration,
    per_tool_timeouts: HashMap<String, Duration>,
    retry: RetryPolicy,
    mode: PermissionMode,
    ceiling: PermissionLevel,
    approval: Option<Arc<dyn ApprovalHandler>>,
}

impl ToolPipeline {
    pub fn builder(
        registry: Arc<ToolRegistry>,
        permissions: Arc<PermissionEngine>,
        hooks: Arc<HookChain>,
        bus: Arc<EventBus>,
    ) -> ToolPipelineBuilder {
        ToolPipelineBuilder {
            registry,
            permissions,
            hooks,
            bus,
            default_timeout: Duration::from_secs(120),
            per_tool_timeouts: HashMap::new(),
            retry: RetryPolicy::default(),
            mode: PermissionMode::Default,
            ceiling: PermissionLevel::Dangerous,
            approval: None,
        }
    }

    fn timeout_for(&self, tool: &str) -> Duration {
        self.per_tool_timeouts
            .get(tool)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Execute one tool call.
    ///
    /// `args_text` is the raw argument JSON text; permission rules and hooks
    /// see (and may rewrite) it before it is parsed for the tool itself.
    pub async fn execute(
        &self,
        call_id: &str,
        tool_name: &str,
        args_text: String,
        session_id: &str,
        ledger: &InvocationLedger,
    ) -> Result<ToolOutput, CoreError> {
        // 1. Permission.
        check_cancellation()?;
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| CoreError::UnknownTool(tool_name.to_string()))?;
        let ctx = CheckContext {
            level: tool.permission_level(),
            read_only: tool.read_only(),
            mutates_files: tool.mutates_files(),
            ceiling: self.ceiling,
            mode: self.mode,
        };
        let mut args_text = args_text;
        match self.permissions.check(tool_name, &args_text, &ctx).await? {
            PermissionDecision::Allowed => {}
            PermissionDecision::AllowedWithModifiedInput(modified) => {
                debug!(tool = tool_name, "permission engine rewrote arguments");
                args_text = modified;
            }
            PermissionDecision::Denied(reason) => {
                ledger.record_attempt(call_id, tool_name);
                ledger.record_outcome(call_id, "denied");
                return Err(CoreError::PermissionDenied {
                    tool: tool_name.to_string(),
                    reason,
                });
            }
            PermissionDecision::AskRequired => {
                if !self.seek_approval(tool_name, &args_text).await {
                    ledger.record_attempt(call_id, tool_name);
                    ledger.record_outcome(call_id, "denied");
                    return Err(CoreError::PermissionDenied {
                        tool: tool_name.to_string(),
                        reason: Some("approval required".into()),
                    });
                }
            }
        }

        // 2. Pre-tool hooks.
        let hook_ctx = HookContext {
            session_id: session_id.to_string(),
            tool_name: Some(tool_name.to_string()),
            tool_input: Some(args_text.clone()),
            ..Default::default()
        };
        let pre = self.hooks.dispatch(HookEvent::PreToolUse, &hook_ctx).await?;
        match pre.decision {
            HookDecision::Block => {
                ledger.record_attempt(call_id, tool_name);
                ledger.record_outcome(call_id, "blocked");
                return Err(CoreError::BlockedByHook {
                    tool: tool_name.to_string(),
                    reason: join_reasons(&pre.reasons),
                });
            }
            HookDecision::Stop => {
                return Err(CoreError::StoppedByHook {
                    reason: pre.reasons.join("; "),
                    output: pre.stop_output,
                });
            }
            HookDecision::Ask => {
                if !self.seek_approval(tool_name, &args_text).await {
                    return Err(CoreError::BlockedByHook {
                        tool: tool_name.to_string(),
                        reason: Some("approval required by hook".into()),
                    });
                }
            }
            _ => {}
        }
        if let Some(modified) = pre.modified_input {
            args_text = modified;
        }

        // The tool itself consumes parsed JSON.
        let args: Value = serde_json::from_str(&args_text).map_err(|e| {
            CoreError::ArgumentParseFailed {
                tool: tool_name.to_string(),
                error: e.to_string(),
            }
        })?;

        self.bus
            .emit(
                Event::new(names::TOOL_CALL_STARTED)
                    .with_source(tool_name.to_string())
                    .with_scope(EventScope::Agent)
                    .with_value(json!({ "call_id": call_id })),
            )
            .await;

        // 3/4. Invoke under deadline, recovering through error hooks.
        let deadline = self.timeout_for(tool_name);
        let started = Instant::now();
        let mut attempt = 0u32;
        let output = loop {
            attempt += 1;
            ledger.record_attempt(call_id, tool_name);
            check_cancellation()?;

            match tokio::time::timeout(deadline, tool.call(args.clone())).await {
                Err(_expired) => {
                    // Timeout: error hooks run, post-hooks must not.
                    ledger.record_outcome(call_id, "timeout");
                    match self
                        .recover(tool_name, session_id, &args_text, &format!(
                            "timed out after {deadline:?}"
                        ))
                        .await
                    {
                        Err(CoreError::FallbackRequested { output }) => {
                            break ToolOutput::ok(output);
                        }
                        Err(other) => return Err(other),
                        Ok(()) => return Err(CoreError::Timeout(deadline)),
                    }
                }
                Ok(Err(err)) => {
                    warn!(tool = tool_name, attempt, error = %err, "tool call failed");
                    match self
                        .recover(tool_name, session_id, &args_text, &err.to_string())
                        .await
                    {
                        Err(CoreError::FallbackRequested { output }) => {
                            ledger.record_outcome(call_id, "fallback");
                            break ToolOutput::ok(output);
                        }
                        Err(other) => return Err(other),
                        Ok(()) => {
                            if attempt < self.retry.max_attempts {
                                tokio::time::sleep(self.retry.delay(attempt)).await;
                                continue;
                            }
                            ledger.record_outcome(call_id, "failed");
                            return Err(CoreError::Tool(err));
                        }
                    }
                }
                Ok(Ok(output)) => break output,
            }
        };

        // 5. Post-tool hooks.
        check_cancellation()?;
        let post_ctx = HookContext {
            session_id: session_id.to_string(),
            tool_name: Some(tool_name.to_string()),
            tool_input: Some(args_text.clone()),
            tool_output: Some(output.content.clone()),
            ..Default::default()
        };
        let post = self.hooks.dispatch(HookEvent::PostToolUse, &post_ctx).await?;
        if post.decision == HookDecision::Stop {
            return Err(CoreError::StoppedByHook {
                reason: post.reasons.join("; "),
                output: post.stop_output.or(Some(output.content)),
            });
        }
        let mut output = output;
        if let Some(replaced) = post.replaced_output {
            output.content = replaced;
        }
        if post.suppress_output {
            output.content.clear();
        }

        // 6. Observability.
        ledger.record_outcome(call_id, "ok");
        self.bus
            .emit(
                Event::new(names::TOOL_CALL_COMPLETED)
                    .with_source(tool_name.to_string())
                    .with_scope(EventScope::Agent)
                    .with_value(json!({
                        "call_id": call_id,
                        "duration_ms": started.elapsed().as_millis() as u64,
                        "fingerprint": output_fingerprint(&output.content),
                    })),
            )
            .await;

        Ok(output)
    }

    async fn seek_approval(&self, tool: &str, args: &str) -> bool {
        match &self.approval {
            Some(handler) => handler.approve(tool, args).await,
            None => false,
        }
    }

    /// Run `ToolError` hooks and translate the aggregate into a recovery
    /// signal: `Ok(())` means "retry or rethrow, caller's choice",
    /// `FallbackRequested` carries a substitute output, and a stop aggregate
    /// ends the turn.
    async fn recover(
        &self,
        tool_name: &str,
        session_id: &str,
        args_text: &str,
        error_message: &str,
    ) -> Result<(), CoreError> {
        let ctx = HookContext {
            session_id: session_id.to_string(),
            tool_name: Some(tool_name.to_string()),
            tool_input: Some(args_text.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        };
        let agg = self.hooks.dispatch(HookEvent::ToolError, &ctx).await?;
        if agg.decision == HookDecision::Stop {
            return Err(CoreError::StoppedByHook {
                reason: agg.reasons.join("; "),
                output: agg.stop_output,
            });
        }
        if let Some(output) = agg.replaced_output {
            return Err(CoreError::FallbackRequested { output });
        }
        Ok(())
    }
}

fn join_reasons(reasons: &[String]) -> Option<String> {
    if reasons.is_empty() {
        None
    } else {
        Some(reasons.join("; "))
    }
}

/// Size-redacted fingerprint of a tool output: byte length plus a sha256
/// prefix, never the content itself.
pub fn output_fingerprint(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{}:{}", content.len(), &hex::encode(digest)[..16])
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
