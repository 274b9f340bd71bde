// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cooperative per-turn cancellation.
//!
//! A [`TurnCancellationToken`] is a monotonic boolean cell: it starts
//! not-cancelled and transitions to cancelled exactly once.  The runner
//! publishes the current turn's token into a task-scoped slot; child tasks
//! spawned through [`spawn_scoped`] inherit it and poll via
//! [`check_cancellation`].
//!
//! The slot is task-local, never thread-local: on a work-stealing executor a
//! task may resume on any worker thread, so thread-local storage would be
//! unsound here.
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::CoreError;

/// Shared one-shot cancellation flag for a single turn.
///
/// Cheap to clone; all clones observe the same cell.  Cancellation is a pure
/// publish — nothing is interrupted until it polls.
#[derive(Debug, Clone, Default)]
pub struct TurnCancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl TurnCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to cancelled.  Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return normally, or fail with [`CoreError::Cancelled`].
    pub fn check_cancellation(&self) -> Result<(), CoreError> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

tokio::task_local! {
    static CURRENT_TOKEN: TurnCancellationToken;
}

/// Run `fut` with `token` published in the task-scoped slot.
pub async fn with_cancellation<F>(token: TurnCancellationToken, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_TOKEN.scope(token, fut).await
}

/// The current turn's token, if this task runs inside one.
pub fn current_cancellation_token() -> Option<TurnCancellationToken> {
    CURRENT_TOKEN.try_with(|t| t.clone()).ok()
}

/// Checkpoint: no-op outside a turn or while not cancelled, error once the
/// turn's token is cancelled.  Never suspends.
pub fn check_cancellation() -> Result<(), CoreError> {
    match current_cancellation_token() {
        Some(token) => token.check_cancellation(),
        None => Ok(()),
    }
}

/// Spawn a child task that inherits the caller's cancellation token.
///
/// Plain `tokio::spawn` would start the child outside the slot; every child
/// task of a turn must go through here (or carry the token explicitly).
pub fn spawn_scoped<F>(fut: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current_cancellation_token() {
        Some(token) => tokio::spawn(with_cancellation(token, fut)),
        None => tokio::spawn(fut),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
