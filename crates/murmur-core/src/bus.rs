// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use serde_json::Value;

/// Where in the lifecycle an event originated.  Several event kinds share a
/// name across scopes; handlers narrow by matching on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventScope {
    Session,
    Step,
    #[default]
    Agent,
}

/// A dynamic observability event.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,
    pub value: Option<Value>,
    pub scope: EventScope,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            source: None,
            value: None,
            scope: EventScope::default(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_scope(mut self, scope: EventScope) -> Self {
        self.scope = scope;
        self
    }
}

type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// In-process publish/subscribe store mapping event name to async handlers.
///
/// `emit` runs all handlers for the event's name concurrently and returns
/// when every one has completed; back-pressure is the caller's business.
/// No durability, no cross-process fan-out — observability only.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `name`.
    pub fn on<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let wrapped: Handler = Arc::new(move |event| Box::pin(handler(event)));
        self.handlers
            .lock()
            .unwrap()
            .entry(name.into())
            .or_default()
            .push(wrapped);
    }

    /// Remove all handlers for `name`.
    pub fn off(&self, name: &str) {
        self.handlers.lock().unwrap().remove(name);
    }

    /// Dispatch `event` to every handler registered under its name.
    pub async fn emit(&self, event: Event) {
        let handlers: Vec<Handler> = {
            let guard = self.handlers.lock().unwrap();
            guard.get(&event.name).cloned().unwrap_or_default()
        };
        if handlers.is_empty() {
            return;
        }
        join_all(handlers.iter().map(|h| h(event.clone()))).await;
    }

    /// Number of handlers registered for `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers
            .lock()
            .unwrap()
            .get(name)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Event names emitted by the pipeline and runner.
pub mod names {
    pub const TOOL_CALL_STARTED: &str = "toolCallStarted";
    pub const TOOL_CALL_COMPLETED: &str = "toolCallCompleted";
    pub const RUN_STARTED: &str = "runStarted";
    pub const RUN_COMPLETED: &str = "runCompleted";
    pub const STEP_STARTED: &str = "stepStarted";
    pub const STEP_COMPLETED: &str = "stepCompleted";
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
