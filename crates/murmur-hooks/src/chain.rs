// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::debug;

use murmur_policy::{ArgPattern, PolicyError, ToolPattern};

use crate::result::{AggregatedHookResult, HookResult};
use crate::HookError;

/// Lifecycle events a hook can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    SessionStart,
    SessionEnd,
    UserPromptSubmit,
    ToolError,
}

/// Everything a handler can see about the moment it fires.
///
/// `tool_input` carries the (possibly already rewritten) argument JSON text;
/// modifications made by a higher tier are visible to lower tiers.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub session_id: String,
    pub tool_name: Option<String>,
    pub tool_input: Option<String>,
    pub tool_output: Option<String>,
    pub error_message: Option<String>,
    pub prompt: Option<String>,
}

/// Filters hook invocations by tool name and arguments, using the same
/// pattern vocabulary as permission rules.
#[derive(Debug, Clone)]
pub struct ToolMatcher {
    tool: ToolPattern,
    arg: Option<ArgPattern>,
}

impl ToolMatcher {
    pub fn new(tool_pattern: &str) -> Result<Self, PolicyError> {
        Ok(Self {
            tool: ToolPattern::compile(tool_pattern)?,
            arg: None,
        })
    }

    pub fn with_arg_pattern(mut self, pattern: &str) -> Result<Self, PolicyError> {
        self.arg = Some(ArgPattern::compile(pattern)?);
        Ok(self)
    }

    fn matches(&self, ctx: &HookContext) -> bool {
        let Some(tool_name) = ctx.tool_name.as_deref() else {
            return false;
        };
        if !self.tool.matches(tool_name) {
            return false;
        }
        match (&self.arg, ctx.tool_input.as_deref()) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(pattern), Some(raw)) => match serde_json::from_str::<Value>(raw) {
                Ok(parsed) => pattern.matches_args(&parsed),
                Err(_) => pattern.matches_raw(raw),
            },
        }
    }
}

/// A hook handler.  An `Err` return aborts the whole dispatch.
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn run(&self, ctx: &HookContext) -> anyhow::Result<HookResult>;
}

/// Blanket impl so plain async closures can be registered.
#[async_trait]
impl<F, Fut> HookHandler for F
where
    F: Fn(HookContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<HookResult>> + Send,
{
    async fn run(&self, ctx: &HookContext) -> anyhow::Result<HookResult> {
        self(ctx.clone()).await
    }
}

/// One registered hook.
pub struct HookRegistration {
    pub id: String,
    pub event: HookEvent,
    pub priority: i32,
    pub matcher: Option<ToolMatcher>,
    pub handler: Arc<dyn HookHandler>,
}

/// Ordered hook dispatcher.
///
/// Handlers at a higher priority run strictly before lower ones; handlers
/// sharing a priority run concurrently and their results are aggregated.
/// A blocking aggregate (block, deny, stop) skips all lower tiers.
pub struct HookChain {
    hooks: Vec<HookRegistration>,
    /// Session ids whose `SessionStart` hooks already ran.
    started_sessions: Mutex<HashSet<String>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            started_sessions: Mutex::new(HashSet::new()),
        }
    }

    pub fn register(
        &mut self,
        id: impl Into<String>,
        event: HookEvent,
        priority: i32,
        matcher: Option<ToolMatcher>,
        handler: impl HookHandler + 'static,
    ) {
        self.hooks.push(HookRegistration {
            id: id.into(),
            event,
            priority,
            matcher,
            handler: Arc::new(handler),
        });
    }

    pub fn unregister(&mut self, id: &str) {
        self.hooks.retain(|h| h.id != id);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Re-arm `SessionStart` for this session id.  Idempotent.
    pub fn reset_session(&self, session_id: &str) {
        self.started_sessions.lock().unwrap().remove(session_id);
    }

    /// Run all matching hooks for `event`.
    ///
    /// `SessionStart` executes at most once per session id until
    /// [`reset_session`](Self::reset_session); repeated dispatches return an
    /// empty `Continue` aggregate.
    pub async fn dispatch(
        &self,
        event: HookEvent,
        ctx: &HookContext,
    ) -> Result<AggregatedHookResult, HookError> {
        if event == HookEvent::SessionStart {
            let mut started = self.started_sessions.lock().unwrap();
            if !started.insert(ctx.session_id.clone()) {
                return Ok(AggregatedHookResult::default());
            }
        }

        // Partition matching hooks into priority tiers, highest first.
        let mut tiers: BTreeMap<i32, Vec<&HookRegistration>> = BTreeMap::new();
        for hook in &self.hooks {
            if hook.event != event {
                continue;
            }
            if let Some(matcher) = &hook.matcher {
                if !matcher.matches(ctx) {
                    continue;
                }
            }
            tiers.entry(hook.priority).or_default().push(hook);
        }

        let mut aggregate = AggregatedHookResult::default();
        let mut ctx = ctx.clone();

        for (priority, tier) in tiers.into_iter().rev() {
            debug!(?event, priority, handlers = tier.len(), "running hook tier");
            let runs = tier.iter().map(|hook| {
                let handler = Arc::clone(&hook.handler);
                let ctx = ctx.clone();
                let id = hook.id.clone();
                async move { (id, handler.run(&ctx).await) }
            });

            let mut results = Vec::with_capacity(tier.len());
            for (id, outcome) in join_all(runs).await {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(source) => return Err(HookError::HandlerFailed { id, source }),
                }
            }

            for result in &results {
                aggregate.absorb(result);
            }

            // A higher tier's modifications feed the next tier's context.
            if let Some(modified) = &aggregate.modified_input {
                ctx.tool_input = Some(modified.clone());
            }
            if let Some(prompt) = &aggregate.modified_prompt {
                ctx.prompt = Some(prompt.clone());
            }

            if aggregate.decision.is_blocking() {
                break;
            }
        }

        Ok(aggregate)
    }
}

impl Default for HookChain {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
