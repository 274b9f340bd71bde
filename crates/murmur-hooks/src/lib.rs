// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Hook chain.
//!
//! Hooks are typed handlers invoked at lifecycle events with the authority
//! to allow, block, modify, or abort what the agent is doing.  Handlers are
//! partitioned by priority: a higher tier completes before any lower-tier
//! handler starts, and the handlers within one tier run concurrently.
mod chain;
mod result;

pub use chain::{HookChain, HookContext, HookEvent, HookHandler, HookRegistration, ToolMatcher};
pub use result::{AggregatedHookResult, HookDecision, HookResult};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    /// A handler raised; the whole dispatch is aborted.
    #[error("hook `{id}` failed: {source}")]
    HandlerFailed { id: String, source: anyhow::Error },
}
