// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Turn runner.
//!
//! Owns the lifetime of a single agent on one transport: reads requests in
//! order, spawns one logical task per turn, and guarantees that every turn
//! id produces at most one terminal event.  Cancellation is pre-emptive
//! (a cancel may arrive before its text request) and strictly per-turn.
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use murmur_hooks::{HookChain, HookContext, HookEvent};

use crate::bus::{names, Event, EventBus, EventScope};
use crate::cancel::{with_cancellation, TurnCancellationToken};
use crate::protocol::{RunEvent, RunInput, RunRequest, RunStatus, APPROVAL_HANDLER_MISSING};
use crate::step::Step;
use crate::transport::RunTransport;
use crate::CoreError;

struct Shared {
    transport: Arc<dyn RunTransport>,
    body: Arc<dyn Step<String, String>>,
    bus: Arc<EventBus>,
    hooks: Arc<HookChain>,
    session_id: String,
    /// Bounded memory of finished turn ids; requests for these are dropped.
    completed: Mutex<LruCache<String, ()>>,
    /// Turns currently executing, by id, with their cancellation tokens.
    running: Mutex<HashMap<String, TurnCancellationToken>>,
    /// Cancels that arrived before their text request.  The token is already
    /// cancelled; the turn completes immediately when the text shows up.
    pre_cancelled: Mutex<HashMap<String, TurnCancellationToken>>,
    approval_tx: Option<mpsc::Sender<(String, bool)>>,
}

/// Drives turns from a transport until its input side closes.
pub struct TurnRunner {
    shared: Arc<Shared>,
}

impl TurnRunner {
    pub fn new(transport: Arc<dyn RunTransport>, body: Arc<dyn Step<String, String>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                body,
                bus: Arc::new(EventBus::new()),
                hooks: Arc::new(HookChain::new()),
                session_id: uuid::Uuid::new_v4().to_string(),
                completed: Mutex::new(LruCache::new(NonZeroUsize::new(1024).unwrap())),
                running: Mutex::new(HashMap::new()),
                pre_cancelled: Mutex::new(HashMap::new()),
                approval_tx: None,
            }),
        }
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        Arc::get_mut(&mut self.shared).expect("configure before run").bus = bus;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<HookChain>) -> Self {
        Arc::get_mut(&mut self.shared).expect("configure before run").hooks = hooks;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        Arc::get_mut(&mut self.shared)
            .expect("configure before run")
            .session_id = session_id.into();
        self
    }

    pub fn with_completed_capacity(mut self, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Arc::get_mut(&mut self.shared).expect("configure before run").completed =
            Mutex::new(LruCache::new(capacity));
        self
    }

    /// Register the approval channel.  Without one, approval responses are
    /// answered with a non-fatal `APPROVAL_HANDLER_MISSING` warning.
    pub fn with_approval_channel(mut self, tx: mpsc::Sender<(String, bool)>) -> Self {
        Arc::get_mut(&mut self.shared)
            .expect("configure before run")
            .approval_tx = Some(tx);
        self
    }

    /// Read requests until the input closes, then drain in-flight turns.
    pub async fn run(&self) -> Result<(), CoreError> {
        let shared = &self.shared;

        let session_ctx = HookContext {
            session_id: shared.session_id.clone(),
            ..Default::default()
        };
        shared
            .hooks
            .dispatch(HookEvent::SessionStart, &session_ctx)
            .await?;

        let background = shared.transport.supports_background_receive();
        let mut turns: JoinSet<()> = JoinSet::new();

        loop {
            let request = match shared.transport.receive().await {
                Ok(request) => request,
                Err(_closed) => break,
            };
            match request.input {
                RunInput::Text { text } => {
                    let turn_id = request.turn_id;
                    if self.is_known(&turn_id) {
                        debug!(turn_id, "duplicate turn dropped");
                        continue;
                    }
                    let token = shared
                        .pre_cancelled
                        .lock()
                        .unwrap()
                        .remove(&turn_id)
                        .unwrap_or_default();
                    shared
                        .running
                        .lock()
                        .unwrap()
                        .insert(turn_id.clone(), token.clone());
                    let shared = Arc::clone(shared);
                    if background {
                        turns.spawn(run_turn(shared, turn_id, text, token));
                    } else {
                        run_turn(shared, turn_id, text, token).await;
                    }
                }
                RunInput::Cancel => {
                    self.handle_cancel(&request.turn_id);
                }
                RunInput::ApprovalResponse { id, approved } => match &shared.approval_tx {
                    Some(tx) => {
                        let _ = tx.send((id, approved)).await;
                    }
                    None => {
                        let _ = shared
                            .transport
                            .send(RunEvent::Warning {
                                turn_id: request.turn_id,
                                code: APPROVAL_HANDLER_MISSING.into(),
                                message: "approval response received but no approval handler \
                                          is registered"
                                    .into(),
                            })
                            .await;
                    }
                },
            }
        }

        while turns.join_next().await.is_some() {}

        let end_ctx = HookContext {
            session_id: shared.session_id.clone(),
            ..Default::default()
        };
        shared.hooks.dispatch(HookEvent::SessionEnd, &end_ctx).await?;
        Ok(())
    }

    fn is_known(&self, turn_id: &str) -> bool {
        self.shared.completed.lock().unwrap().contains(turn_id)
            || self.shared.running.lock().unwrap().contains_key(turn_id)
    }

    fn handle_cancel(&self, turn_id: &str) {
        // A cancel for a completed turn is absorbed silently; in particular
        // it must not leave a cancelled token behind that a later retry of
        // the same turn id would inherit.
        if self.shared.completed.lock().unwrap().contains(turn_id) {
            debug!(turn_id, "late cancel absorbed");
            return;
        }
        if let Some(token) = self.shared.running.lock().unwrap().get(turn_id) {
            token.cancel();
            return;
        }
        // Pre-emptive: remember the cancel for a text request still on its
        // way.  Cancelling a turn that never materializes emits nothing.
        self.shared
            .pre_cancelled
            .lock()
            .unwrap()
            .entry(turn_id.to_string())
            .or_default()
            .cancel();
    }
}

async fn run_turn(
    shared: Arc<Shared>,
    turn_id: String,
    text: String,
    token: TurnCancellationToken,
) {
    if shared
        .transport
        .send(RunEvent::RunStarted {
            turn_id: turn_id.clone(),
        })
        .await
        .is_err()
    {
        warn!(turn_id, "event channel closed before turn start");
    }
    shared
        .bus
        .emit(
            Event::new(names::RUN_STARTED)
                .with_scope(EventScope::Session)
                .with_value(json!({ "turn_id": turn_id })),
        )
        .await;

    let (status, final_output, error_message) = if token.is_cancelled() {
        // Pre-emptively cancelled: the agent body never observes the prompt.
        (RunStatus::Cancelled, None, None)
    } else {
        let outcome = with_cancellation(token.clone(), async {
            let prompt_ctx = HookContext {
                session_id: shared.session_id.clone(),
                prompt: Some(text.clone()),
                ..Default::default()
            };
            let agg = shared
                .hooks
                .dispatch(HookEvent::UserPromptSubmit, &prompt_ctx)
                .await
                .map_err(CoreError::from)?;
            if agg.decision.is_blocking() {
                return Err(anyhow::Error::from(CoreError::StoppedByHook {
                    reason: agg.reasons.join("; "),
                    output: None,
                }));
            }
            let input = agg.modified_prompt.unwrap_or(text);
            shared.body.run(input).await
        })
        .await;

        match outcome {
            Ok(output) => (RunStatus::Completed, Some(output), None),
            Err(err) => classify_turn_error(err),
        }
    };

    shared.running.lock().unwrap().remove(&turn_id);
    shared
        .completed
        .lock()
        .unwrap()
        .put(turn_id.clone(), ());

    let _ = shared
        .transport
        .send(RunEvent::completed(
            turn_id.clone(),
            status,
            final_output,
            error_message,
        ))
        .await;
    shared
        .bus
        .emit(
            Event::new(names::RUN_COMPLETED)
                .with_scope(EventScope::Session)
                .with_value(json!({ "turn_id": turn_id, "status": format!("{status:?}") })),
        )
        .await;
}

/// Map a turn-body error onto its terminal status.  `Cancelled` never
/// surfaces as an error message — only as the status.
fn classify_turn_error(err: anyhow::Error) -> (RunStatus, Option<String>, Option<String>) {
    match err.downcast_ref::<CoreError>() {
        Some(CoreError::Cancelled) => (RunStatus::Cancelled, None, None),
        Some(CoreError::StoppedByHook { reason, output }) => {
            (RunStatus::Stopped, output.clone(), Some(reason.clone()))
        }
        _ => (RunStatus::Failed, None, Some(err.to_string())),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
