// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// The callable the execution core drives.
///
/// Given a transcript and options, returns a stream of response deltas.
/// Everything about the model itself — wire protocol, tokenization, prompt
/// assembly — is the implementor's concern.
#[async_trait]
pub trait LanguageModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;

    /// Non-streaming convenience: drain the stream and return the
    /// concatenated text.  Stream-level `Error` events become hard errors.
    async fn complete_text(&self, req: CompletionRequest) -> anyhow::Result<String> {
        let mut stream = self.complete(req).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::TextDelta(delta) => text.push_str(&delta),
                ResponseEvent::Error(e) => anyhow::bail!("model stream error: {e}"),
                ResponseEvent::Done => break,
                _ => {}
            }
        }
        Ok(text)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, MockProvider};

    #[tokio::test]
    async fn complete_text_concatenates_deltas() {
        let provider = MockProvider;
        let req = CompletionRequest {
            messages: vec![Message::user("ping")],
            ..Default::default()
        };
        let text = provider.complete_text(req).await.unwrap();
        assert!(text.contains("ping"));
    }
}
