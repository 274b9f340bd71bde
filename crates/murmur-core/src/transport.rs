// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Notify};

use crate::protocol::{RunEvent, RunRequest};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request side is closed; no more requests will arrive.
    #[error("transport input closed")]
    InputClosed,

    /// The event side is closed; events can no longer be delivered.
    #[error("transport output closed")]
    OutputClosed,
}

/// A framed bidirectional channel between a client and the turn runner.
///
/// The protocol carried over it is fixed ([`RunRequest`] / [`RunEvent`]);
/// the medium — in-memory channels, sockets, pipes — is the implementor's
/// concern.
#[async_trait]
pub trait RunTransport: Send + Sync {
    /// Await the next request.
    async fn receive(&self) -> Result<RunRequest, TransportError>;

    /// Deliver an event to the client.
    async fn send(&self, event: RunEvent) -> Result<(), TransportError>;

    /// Stop accepting requests; pending `receive` calls fail with
    /// `InputClosed`.
    fn close_input(&self);

    /// Close both directions.
    fn close(&self);

    /// When `false`, the runner reads requests only between turns instead of
    /// concurrently with them.  A policy switch, not a correctness one.
    fn supports_background_receive(&self) -> bool {
        true
    }
}

/// In-memory transport backed by tokio channels.
///
/// [`ChannelTransport::pair`] returns the transport plus the client-side
/// handles: a sender for requests and a receiver for events.
pub struct ChannelTransport {
    incoming: Mutex<mpsc::Receiver<RunRequest>>,
    outgoing: mpsc::Sender<RunEvent>,
    input_closed: AtomicBool,
    output_closed: AtomicBool,
    closed_notify: Arc<Notify>,
    background_receive: bool,
}

impl ChannelTransport {
    pub fn pair(buffer: usize) -> (Self, mpsc::Sender<RunRequest>, mpsc::Receiver<RunEvent>) {
        let (req_tx, req_rx) = mpsc::channel(buffer);
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let transport = Self {
            incoming: Mutex::new(req_rx),
            outgoing: event_tx,
            input_closed: AtomicBool::new(false),
            output_closed: AtomicBool::new(false),
            closed_notify: Arc::new(Notify::new()),
            background_receive: true,
        };
        (transport, req_tx, event_rx)
    }

    /// Advertise `supports_background_receive = false`.
    pub fn without_background_receive(mut self) -> Self {
        self.background_receive = false;
        self
    }
}

#[async_trait]
impl RunTransport for ChannelTransport {
    async fn receive(&self) -> Result<RunRequest, TransportError> {
        if self.input_closed.load(Ordering::SeqCst) {
            return Err(TransportError::InputClosed);
        }
        let mut rx = self.incoming.lock().await;
        tokio::select! {
            biased;
            _ = self.closed_notify.notified() => Err(TransportError::InputClosed),
            msg = rx.recv() => msg.ok_or(TransportError::InputClosed),
        }
    }

    async fn send(&self, event: RunEvent) -> Result<(), TransportError> {
        if self.output_closed.load(Ordering::SeqCst) {
            return Err(TransportError::OutputClosed);
        }
        self.outgoing
            .send(event)
            .await
            .map_err(|_| TransportError::OutputClosed)
    }

    fn close_input(&self) {
        self.input_closed.store(true, Ordering::SeqCst);
        self.closed_notify.notify_waiters();
    }

    fn close(&self) {
        self.input_closed.store(true, Ordering::SeqCst);
        self.output_closed.store(true, Ordering::SeqCst);
        self.closed_notify.notify_waiters();
    }

    fn supports_background_receive(&self) -> bool {
        self.background_receive
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
