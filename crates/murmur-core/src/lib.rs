// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agent execution core.
//!
//! Three tightly coupled pieces live here:
//!
//! - the **tool execution pipeline** ([`ToolPipeline`]): permission check,
//!   pre-hooks, timeout/retry, post-hooks around a single tool call;
//! - the **turn runner** ([`TurnRunner`]): drives a turn from a
//!   [`RunRequest`] to its terminal [`RunEvent`] over a transport, with
//!   idempotent turn ids and pre-emptive, mid-flight cancellation;
//! - the **event bus** ([`EventBus`]): in-process pub/sub used by both for
//!   observability.
//!
//! The step combinators ([`step`]) compose agent bodies; the cancellation
//! token ([`cancel`]) threads through every layer via a task-scoped slot.
mod bus;
pub mod cancel;
mod error;
mod options;
mod pipeline;
mod protocol;
pub mod step;
mod runner;
mod transport;

pub use bus::{names as event_names, Event, EventBus, EventScope};
pub use cancel::{
    check_cancellation, current_cancellation_token, spawn_scoped, with_cancellation,
    TurnCancellationToken,
};
pub use error::CoreError;
pub use options::AgentOptions;
pub use pipeline::{
    ApprovalHandler, BackoffStrategy, InvocationLedger, LedgerEntry, RetryPolicy, ToolPipeline,
    ToolPipelineBuilder,
};
pub use protocol::{RunEvent, RunInput, RunRequest, RunStatus, APPROVAL_HANDLER_MISSING};
pub use runner::TurnRunner;
pub use transport::{ChannelTransport, RunTransport, TransportError};
